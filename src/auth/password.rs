//! Argon2 password hashes in PHC string form.

use anyhow::{anyhow, Context, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use std::sync::OnceLock;

// Stand-in hash for logins that have no usable account.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Hash a password with Argon2id default parameters.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Check `password` against a stored PHC hash. A mismatch is `Ok(false)`.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid password hash"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// `verify_password` on the blocking pool.
pub(crate) async fn verify_password_blocking(
    password: SecretString,
    stored_hash: String,
) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(password.expose_secret(), &stored_hash))
        .await
        .context("password verification task failed")?
}

fn dummy_hash() -> Result<&'static str> {
    if let Some(hash) = DUMMY_HASH.get() {
        return Ok(hash.as_str());
    }
    let hash = hash_password("warden-dummy-password")?;
    Ok(DUMMY_HASH.get_or_init(|| hash).as_str())
}

/// Spend one Argon2 verification on a fixed hash, so unknown accounts cost
/// the same as a wrong password.
pub(crate) async fn verify_dummy_password_blocking(password: SecretString) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let hash = dummy_hash()?;
        verify_password(password.expose_secret(), hash).map(|_| ())
    })
    .await
    .context("password verification task failed")?
}
