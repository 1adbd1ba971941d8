//! One-time codes and challenge session identifiers.
//!
//! Both are drawn from the OS CSPRNG. Codes are compared in constant time so
//! the comparison does not reveal how many leading digits matched.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use regex::Regex;

pub const OTP_DIGITS: usize = 8;
const OTP_MODULUS: u32 = 100_000_000;
const SESSION_ID_BYTES: usize = 32;

/// Generate a zero-padded 8-digit code, uniform over `00000000..=99999999`.
#[must_use]
pub fn generate_otp() -> String {
    let value = OsRng.gen_range(0..OTP_MODULUS);
    format!("{value:0width$}", width = OTP_DIGITS)
}

/// Generate an unguessable session id (256 bits, base64url without padding).
#[must_use]
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

#[must_use]
pub fn is_valid_otp(code: &str) -> bool {
    code.len() == OTP_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

#[must_use]
pub fn is_valid_session_id(session_id: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_-]{43}$").is_ok_and(|re| re.is_match(session_id))
}

/// Constant-time equality for codes of equal length.
#[must_use]
pub fn codes_match(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
