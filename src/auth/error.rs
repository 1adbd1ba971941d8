//! Error taxonomy for the login pipeline.
//!
//! Internal steps return `Result<LoginOutcome, AuthError>`; only the public
//! `Authenticator` methods turn an `AuthError` into a `LoginOutcome`.

use thiserror::Error;

/// Why a login step was denied. Logged server-side, never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    UnknownUser,
    DeletedUser,
    BadPassword,
    PrivilegedRoleOnGeneralEntry,
    NonPrivilegedRoleOnPrivilegedEntry,
    UnknownRole,
    SessionInvalid,
    OtpMismatch,
}

impl DenialReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownUser => "unknown_user",
            Self::DeletedUser => "deleted_user",
            Self::BadPassword => "bad_password",
            Self::PrivilegedRoleOnGeneralEntry => "privileged_role_on_general_entry",
            Self::NonPrivilegedRoleOnPrivilegedEntry => "non_privileged_role_on_privileged_entry",
            Self::UnknownRole => "unknown_role",
            Self::SessionInvalid => "session_invalid",
            Self::OtpMismatch => "otp_mismatch",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input, rejected before any state is touched.
    #[error("invalid request: {0}")]
    Validation(&'static str),
    #[error("authentication denied: {}", .0.as_str())]
    Denied(DenialReason),
    /// The notifier failed, timed out, or refused the OTP.
    #[error("otp dispatch failed: {0}")]
    Dispatch(String),
    #[error("internal fault: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub(crate) fn denied(reason: DenialReason) -> Self {
        Self::Denied(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_does_not_leak_more_than_the_reason() {
        let err = AuthError::denied(DenialReason::BadPassword);
        assert_eq!(err.to_string(), "authentication denied: bad_password");
    }

    #[test]
    fn internal_wraps_anyhow_with_context() {
        let err: AuthError = anyhow::anyhow!("pool closed").context("load user").into();
        assert!(matches!(err, AuthError::Internal(_)));
        assert!(err.to_string().contains("pool closed"));
    }
}
