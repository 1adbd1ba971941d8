//! Values returned by every public login operation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Which login endpoint a request arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// Everyone except the privileged role.
    General,
    /// Only the privileged role.
    Privileged,
}

impl EntryPoint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Privileged => "privileged",
        }
    }
}

/// Claims for a fully verified user. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedClaims {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub image_url: Option<String>,
}

/// Handle for a pending OTP challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub session_id: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(AuthenticatedClaims),
    OtpRequired(OtpChallenge),
    Denied,
    /// Malformed request, rejected before touching any state.
    Invalid,
    /// Unexpected internal failure.
    Fault,
}

impl LoginOutcome {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn claims(&self) -> Option<&AuthenticatedClaims> {
        match self {
            Self::Authenticated(claims) => Some(claims),
            _ => None,
        }
    }

    #[must_use]
    pub fn challenge(&self) -> Option<&OtpChallenge> {
        match self {
            Self::OtpRequired(challenge) => Some(challenge),
            _ => None,
        }
    }

    /// Short label used in logs and span fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::OtpRequired(_) => "otp_required",
            Self::Denied => "denied",
            Self::Invalid => "invalid",
            Self::Fault => "fault",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> AuthenticatedClaims {
        AuthenticatedClaims {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: "user".to_string(),
            image_url: None,
        }
    }

    #[test]
    fn accessors_match_variant() {
        let outcome = LoginOutcome::Authenticated(claims());
        assert!(outcome.is_authenticated());
        assert_eq!(outcome.claims().map(|c| c.username.as_str()), Some("alice"));
        assert!(outcome.challenge().is_none());
        assert_eq!(outcome.kind(), "authenticated");

        assert!(!LoginOutcome::Denied.is_authenticated());
        assert!(LoginOutcome::Denied.claims().is_none());
        assert_eq!(LoginOutcome::Fault.kind(), "fault");
    }

    #[test]
    fn entry_point_labels() {
        assert_eq!(EntryPoint::General.as_str(), "general");
        assert_eq!(EntryPoint::Privileged.as_str(), "privileged");
    }
}
