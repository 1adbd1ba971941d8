//! Request and response bodies for the auth endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OtpChallenge;

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    /// Username, or an email address when it contains `@`.
    #[serde(alias = "username", alias = "email")]
    pub identity: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("identity", &self.identity)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Deserialize)]
pub struct VerifyOtpRequest {
    pub session_id: String,
    pub user_id: Uuid,
    pub code: String,
}

impl fmt::Debug for VerifyOtpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyOtpRequest")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("code", &"***")
            .finish()
    }
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResendOtpRequest {
    pub session_id: String,
    pub user_id: Uuid,
}

/// Returned with `202 Accepted` while a code is outstanding.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpChallengeResponse {
    pub authenticated: bool,
    pub otp_required: bool,
    pub session_id: String,
    pub user_id: Uuid,
    pub expires_at: String,
}

impl From<&OtpChallenge> for OtpChallengeResponse {
    fn from(challenge: &OtpChallenge) -> Self {
        Self {
            authenticated: false,
            otp_required: true,
            session_id: challenge.session_id.clone(),
            user_id: challenge.user_id,
            expires_at: challenge
                .expires_at
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }
}

/// Body of every unsuccessful response.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeniedResponse {
    pub authenticated: bool,
}

impl DeniedResponse {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            authenticated: false,
        }
    }
}

impl Default for DeniedResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Documented shape of a successful login.
///
/// The token field is `access_token` unless the naming table maps the
/// username to another field; the served body is built dynamically.
#[derive(ToSchema, Serialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_at: String,
    pub authenticated: bool,
    pub otp_required: bool,
}
