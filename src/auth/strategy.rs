//! Completing a login once the password and role checks have passed.
//!
//! The authenticator picks the strategy; a strategy never decides whether it
//! should run.

use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::error::AuthError;
use super::notifier::{Notifier, Recipient};
use super::otp::{generate_otp, generate_session_id};
use super::outcome::{AuthenticatedClaims, EntryPoint, LoginOutcome, OtpChallenge};
use super::roles::Role;
use super::session::{PendingLogin, SessionStore};
use super::users::UserRecord;

/// A user that passed credential and partition checks.
pub(crate) struct VerifiedLogin<'a> {
    pub(crate) user: &'a UserRecord,
    pub(crate) role: &'a Role,
    pub(crate) entry_point: EntryPoint,
}

impl VerifiedLogin<'_> {
    pub(crate) fn claims(&self) -> AuthenticatedClaims {
        AuthenticatedClaims {
            user_id: self.user.id,
            username: self.user.username.clone(),
            email: self.user.email.clone(),
            role: self.role.name.clone(),
            image_url: self.user.image_url.clone(),
        }
    }

    pub(crate) fn recipient(&self) -> Recipient {
        Recipient {
            user_id: self.user.id,
            username: self.user.username.clone(),
            email: self.user.email.clone(),
        }
    }
}

pub(crate) trait LoginStrategy {
    async fn authenticate(&self, login: &VerifiedLogin<'_>) -> Result<LoginOutcome, AuthError>;
}

/// Single factor: the password check was enough.
pub(crate) struct PasswordStrategy;

impl LoginStrategy for PasswordStrategy {
    async fn authenticate(&self, login: &VerifiedLogin<'_>) -> Result<LoginOutcome, AuthError> {
        Ok(LoginOutcome::Authenticated(login.claims()))
    }
}

/// Second factor: send a code and park the login in the session store.
pub(crate) struct OtpStrategy<'a> {
    pub(crate) sessions: &'a dyn SessionStore,
    pub(crate) notifier: &'a dyn Notifier,
    pub(crate) otp_ttl: Duration,
    pub(crate) dispatch_timeout: Duration,
}

impl LoginStrategy for OtpStrategy<'_> {
    async fn authenticate(&self, login: &VerifiedLogin<'_>) -> Result<LoginOutcome, AuthError> {
        let code = generate_otp();
        let session_id = generate_session_id();

        // Nothing is stored unless the notifier accepted the code.
        dispatch_code(self.notifier, &login.recipient(), &code, self.dispatch_timeout).await?;

        let record = PendingLogin::new(session_id.clone(), login.user.id, code, login.entry_point);
        let challenge = OtpChallenge {
            session_id: session_id.clone(),
            user_id: record.user_id,
            issued_at: record.created_at,
            expires_at: record.expires_at(self.otp_ttl),
        };
        self.sessions.set_session(&session_id, record);
        debug!(user_id = %login.user.id, "otp challenge stored");

        Ok(LoginOutcome::OtpRequired(challenge))
    }
}

/// Send a code, treating an error or a timeout as a dispatch failure.
pub(crate) async fn dispatch_code(
    notifier: &dyn Notifier,
    recipient: &Recipient,
    code: &str,
    limit: Duration,
) -> Result<(), AuthError> {
    match timeout(limit, notifier.send_otp_code(recipient, code)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AuthError::Dispatch(format!("{err:#}"))),
        Err(_) => Err(AuthError::Dispatch(format!(
            "notifier timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
