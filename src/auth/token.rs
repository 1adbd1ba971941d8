//! PASETO v4.public access tokens.
//!
//! Flow Overview:
//! 1) Build claims from `AuthenticatedClaims` with RFC3339 timestamps.
//! 2) Sign them with an Ed25519 key through `pasetors`.
//! 3) Pick the response field name from the naming table.
//!
//! The footer carries the PASERK `k4.pid` of the verifying key.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use ed25519_dalek::SigningKey;
use pasetors::errors::Error as PasetorsError;
use pasetors::footer::Footer;
use pasetors::keys::{AsymmetricPublicKey, AsymmetricSecretKey};
use pasetors::paserk::{FormatAsPaserk, Id};
use pasetors::token::UntrustedToken;
use pasetors::version4::{PublicToken, V4};
use pasetors::Public;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use ulid::Ulid;

use super::outcome::AuthenticatedClaims;

pub const DEFAULT_TOKEN_FIELD: &str = "access_token";
// Keys the response body already uses.
const RESERVED_FIELDS: [&str; 3] = ["authenticated", "expires_at", "otp_required"];

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token ttl must be positive")]
    InvalidTtl,
    #[error("signing seed must be 32 bytes of base64")]
    InvalidSeed,
    #[error("invalid signing key")]
    InvalidKey,
    #[error("invalid token field mapping: {0}")]
    InvalidMapping(String),
    #[error("malformed token")]
    Malformed,
    #[error("missing or invalid footer")]
    InvalidFooter,
    #[error("unknown key id")]
    UnknownKid,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("token expired")]
    Expired,
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub iat: String,
    pub exp: String,
    pub jti: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFooter {
    kid: String,
}

/// A signed token and the response field it belongs under.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub field_name: String,
    pub token: String,
    pub expires_at: String,
}

/// Maps specific usernames to an alternate response field. Built once.
#[derive(Debug, Clone)]
pub struct TokenNaming {
    overrides: HashMap<String, String>,
    default_field: String,
}

impl Default for TokenNaming {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            default_field: DEFAULT_TOKEN_FIELD.to_string(),
        }
    }
}

fn valid_field(field: &str) -> bool {
    !RESERVED_FIELDS.contains(&field)
        && Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").is_ok_and(|re| re.is_match(field))
}

impl TokenNaming {
    /// # Errors
    /// Returns an error if any field name is empty, reserved or not an identifier.
    pub fn new(
        default_field: &str,
        overrides: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, TokenError> {
        if !valid_field(default_field) {
            return Err(TokenError::InvalidMapping(default_field.to_string()));
        }
        let mut table = HashMap::new();
        for (username, field) in overrides {
            if username.is_empty() || !valid_field(&field) {
                return Err(TokenError::InvalidMapping(format!("{username}={field}")));
            }
            table.insert(username, field);
        }
        Ok(Self {
            overrides: table,
            default_field: default_field.to_string(),
        })
    }

    /// Parse a `username=field` pair.
    ///
    /// # Errors
    /// Returns an error if the separator or either side is missing.
    pub fn parse_mapping(raw: &str) -> Result<(String, String), TokenError> {
        let (username, field) = raw
            .split_once('=')
            .ok_or_else(|| TokenError::InvalidMapping(raw.to_string()))?;
        let (username, field) = (username.trim(), field.trim());
        if username.is_empty() || field.is_empty() {
            return Err(TokenError::InvalidMapping(raw.to_string()));
        }
        Ok((username.to_string(), field.to_string()))
    }

    #[must_use]
    pub fn field_for(&self, username: &str) -> &str {
        self.overrides
            .get(username)
            .map_or(self.default_field.as_str(), String::as_str)
    }
}

pub struct TokenIssuer {
    secret_key: AsymmetricSecretKey<V4>,
    public_key: AsymmetricPublicKey<V4>,
    key_id: String,
    issuer: String,
    audience: String,
    ttl: TimeDelta,
    naming: TokenNaming,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key_id", &self.key_id)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// # Errors
    /// Returns an error if `ttl_seconds` is not positive or the key is rejected.
    pub fn new(
        signing_key: SigningKey,
        issuer: String,
        audience: String,
        ttl_seconds: i64,
        naming: TokenNaming,
    ) -> Result<Self, TokenError> {
        if ttl_seconds <= 0 {
            return Err(TokenError::InvalidTtl);
        }
        let ttl = TimeDelta::try_seconds(ttl_seconds).ok_or(TokenError::InvalidTtl)?;

        let secret_key = AsymmetricSecretKey::<V4>::from(&signing_key.to_keypair_bytes())
            .map_err(|_| TokenError::InvalidKey)?;
        let public_key =
            AsymmetricPublicKey::<V4>::from(signing_key.verifying_key().as_bytes().as_slice())
                .map_err(|_| TokenError::InvalidKey)?;
        let key_id = paserk_id(&public_key)?;

        Ok(Self {
            secret_key,
            public_key,
            key_id,
            issuer,
            audience,
            ttl,
            naming,
        })
    }

    /// Fresh Ed25519 key; tokens do not survive a restart.
    #[must_use]
    pub fn random_signing_key() -> SigningKey {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        SigningKey::from_bytes(&seed)
    }

    /// Ed25519 key from a base64 (standard alphabet) 32-byte seed.
    ///
    /// # Errors
    /// Returns an error if the seed does not decode to 32 bytes.
    pub fn signing_key_from_seed(seed_b64: &str) -> Result<SigningKey, TokenError> {
        let bytes = Base64::decode_vec(seed_b64.trim()).map_err(|_| TokenError::InvalidSeed)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| TokenError::InvalidSeed)?;
        Ok(SigningKey::from_bytes(&seed))
    }

    /// PASERK `k4.pid` of the verifying key.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    #[must_use]
    pub fn naming(&self) -> &TokenNaming {
        &self.naming
    }

    /// Sign claims for a fully authenticated user.
    ///
    /// # Errors
    /// Returns an error if encoding or signing fails.
    pub fn issue(&self, claims: &AuthenticatedClaims) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let exp = rfc3339(now + self.ttl);

        let token_claims = TokenClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: claims.user_id.to_string(),
            username: claims.username.clone(),
            email: claims.email.clone(),
            role: claims.role.clone(),
            image_url: claims.image_url.clone(),
            iat: rfc3339(now),
            exp: exp.clone(),
            jti: Ulid::new().to_string(),
        };
        let footer = TokenFooter {
            kid: self.key_id.clone(),
        };

        let payload = serde_json::to_vec(&token_claims)?;
        let footer_bytes = serde_json::to_vec(&footer)?;
        let token = PublicToken::sign(&self.secret_key, &payload, Some(&footer_bytes), None)
            .map_err(|err| map_paseto_error(&err))?;

        Ok(IssuedToken {
            field_name: self.naming.field_for(&claims.username).to_string(),
            token,
            expires_at: exp,
        })
    }

    /// Check signature, issuer, audience and expiry, returning the claims.
    ///
    /// # Errors
    /// Returns an error describing the first failed check.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let untrusted =
            UntrustedToken::<Public, V4>::try_from(token).map_err(|err| map_paseto_error(&err))?;
        let footer_bytes = untrusted.untrusted_footer();
        if footer_bytes.is_empty() {
            return Err(TokenError::InvalidFooter);
        }
        if footer_kid(footer_bytes)? != self.key_id {
            return Err(TokenError::UnknownKid);
        }

        let trusted = PublicToken::verify(&self.public_key, &untrusted, None, None)
            .map_err(|err| map_paseto_error(&err))?;
        let claims: TokenClaims = serde_json::from_str(trusted.payload())?;

        if claims.iss != self.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        if claims.aud != self.audience {
            return Err(TokenError::InvalidAudience);
        }
        let exp = DateTime::parse_from_rfc3339(&claims.exp)
            .map_err(|_| TokenError::InvalidTimestamp)?;
        if exp <= Utc::now() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn paserk_id(key: &AsymmetricPublicKey<V4>) -> Result<String, TokenError> {
    let id = Id::from(key);
    let mut kid = String::new();
    id.fmt(&mut kid).map_err(|_| TokenError::InvalidKey)?;
    Ok(kid)
}

fn footer_kid(footer_bytes: &[u8]) -> Result<String, TokenError> {
    let mut footer = Footer::new();
    footer
        .parse_bytes(footer_bytes)
        .map_err(|_| TokenError::InvalidFooter)?;
    let kid = footer
        .get_claim("kid")
        .and_then(|value| value.as_str())
        .ok_or(TokenError::InvalidFooter)?;
    Ok(kid.to_string())
}

fn map_paseto_error(err: &PasetorsError) -> TokenError {
    match err {
        PasetorsError::TokenValidation => TokenError::InvalidSignature,
        PasetorsError::FooterParsing => TokenError::InvalidFooter,
        PasetorsError::Key => TokenError::InvalidKey,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use base64ct::Base64UrlUnpadded;
    use uuid::Uuid;

    const HEADER: &str = "v4.public.";

    fn claims(username: &str) -> AuthenticatedClaims {
        AuthenticatedClaims {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            role: "user".to_string(),
            image_url: None,
        }
    }

    fn issuer(naming: TokenNaming) -> Result<TokenIssuer> {
        Ok(TokenIssuer::new(
            TokenIssuer::random_signing_key(),
            "warden".to_string(),
            "warden".to_string(),
            60,
            naming,
        )?)
    }

    #[test]
    fn issues_verifiable_token() -> Result<()> {
        let issuer = issuer(TokenNaming::default())?;
        let claims = claims("alice");
        let issued = issuer.issue(&claims)?;

        assert!(issued.token.starts_with(HEADER));
        assert_eq!(issued.field_name, DEFAULT_TOKEN_FIELD);
        assert!(issuer.key_id().starts_with("k4.pid."));

        let verified = issuer.verify(&issued.token)?;
        assert_eq!(verified.sub, claims.user_id.to_string());
        assert_eq!(verified.username, "alice");
        assert_eq!(verified.role, "user");
        assert_eq!(verified.exp, issued.expires_at);
        assert!(Ulid::from_string(&verified.jti).is_ok());
        Ok(())
    }

    #[test]
    fn naming_table_overrides_field() -> Result<()> {
        let naming = TokenNaming::new(
            DEFAULT_TOKEN_FIELD,
            [("root".to_string(), "admin_token".to_string())],
        )?;
        let issuer = issuer(naming)?;
        assert_eq!(issuer.issue(&claims("root"))?.field_name, "admin_token");
        assert_eq!(issuer.issue(&claims("alice"))?.field_name, "access_token");
        // Exact match only.
        assert_eq!(issuer.naming().field_for("Root"), "access_token");
        Ok(())
    }

    #[test]
    fn naming_rejects_bad_fields() {
        let none: [(String, String); 0] = [];
        assert!(TokenNaming::new("", none.clone()).is_err());
        assert!(TokenNaming::new("authenticated", none).is_err());
        assert!(TokenNaming::new("access_token", [("a".to_string(), "bad field".to_string())]).is_err());
        assert!(TokenNaming::new("access_token", [(String::new(), "x".to_string())]).is_err());
    }

    #[test]
    fn parse_mapping_pairs() -> Result<()> {
        assert_eq!(
            TokenNaming::parse_mapping(" root = admin_token ")?,
            ("root".to_string(), "admin_token".to_string())
        );
        assert!(TokenNaming::parse_mapping("root").is_err());
        assert!(TokenNaming::parse_mapping("=field").is_err());
        assert!(TokenNaming::parse_mapping("root=").is_err());
        Ok(())
    }

    #[test]
    fn rejects_token_from_other_key() -> Result<()> {
        let a = issuer(TokenNaming::default())?;
        let b = issuer(TokenNaming::default())?;
        let token = a.issue(&claims("alice"))?.token;
        assert!(matches!(b.verify(&token), Err(TokenError::UnknownKid)));
        Ok(())
    }

    #[test]
    fn rejects_tampered_payload() -> Result<()> {
        let issuer = issuer(TokenNaming::default())?;
        let token = issuer.issue(&claims("alice"))?.token;
        let rest = token.trim_start_matches(HEADER);
        let (body, footer) = rest.split_once('.').ok_or(TokenError::Malformed)?;
        let mut bytes = Base64UrlUnpadded::decode_vec(body).map_err(|_| TokenError::Malformed)?;
        bytes[0] ^= 0x01;
        let forged = format!("{HEADER}{}.{footer}", Base64UrlUnpadded::encode_string(&bytes));
        assert!(matches!(issuer.verify(&forged), Err(TokenError::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_wrong_audience() -> Result<()> {
        let key = TokenIssuer::random_signing_key();
        let seed = Base64::encode_string(&key.to_bytes());
        let minting = TokenIssuer::new(
            TokenIssuer::signing_key_from_seed(&seed)?,
            "warden".to_string(),
            "other".to_string(),
            60,
            TokenNaming::default(),
        )?;
        let checking = TokenIssuer::new(
            TokenIssuer::signing_key_from_seed(&seed)?,
            "warden".to_string(),
            "warden".to_string(),
            60,
            TokenNaming::default(),
        )?;
        let token = minting.issue(&claims("alice"))?.token;
        assert!(matches!(checking.verify(&token), Err(TokenError::InvalidAudience)));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() -> Result<()> {
        let issuer = issuer(TokenNaming::default())?;
        assert!(matches!(issuer.verify(""), Err(TokenError::Malformed)));
        assert!(matches!(issuer.verify("v4.local.abc.def"), Err(TokenError::Malformed)));
        assert!(matches!(issuer.verify("v4.public.abc"), Err(TokenError::Malformed)));
        Ok(())
    }

    #[test]
    fn rejects_token_without_footer() -> Result<()> {
        let issuer = issuer(TokenNaming::default())?;
        let token = issuer.issue(&claims("alice"))?.token;
        let (without_footer, _) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        assert!(matches!(issuer.verify(without_footer), Err(TokenError::InvalidFooter)));
        Ok(())
    }

    #[test]
    fn seed_must_be_32_bytes() {
        assert!(TokenIssuer::signing_key_from_seed("c2hvcnQ=").is_err());
        assert!(TokenIssuer::signing_key_from_seed("not base64!").is_err());
        let seed = Base64::encode_string(&[7u8; 32]);
        assert!(TokenIssuer::signing_key_from_seed(&seed).is_ok());
    }

    #[test]
    fn ttl_must_be_positive() {
        let result = TokenIssuer::new(
            TokenIssuer::random_signing_key(),
            "warden".to_string(),
            "warden".to_string(),
            0,
            TokenNaming::default(),
        );
        assert!(matches!(result, Err(TokenError::InvalidTtl)));
    }
}
