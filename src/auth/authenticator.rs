//! Login orchestration and the OTP challenge state machine.
//!
//! ```text
//! login / admin_login
//!   credentials ok + role partition ok
//!     -> Password strategy           -> Authenticated
//!     -> OTP strategy                -> OtpRequired(session)
//!   anything else                    -> Denied
//!
//! OtpRequired(session)
//!   verify_otp(code)   match         -> Authenticated   (session consumed)
//!                      mismatch      -> Denied          (session consumed)
//!   resend_otp()       notifier up   -> OtpRequired(new session)
//!                      notifier down -> Authenticated   (single factor)
//! ```
//!
//! Internal steps return `Result<LoginOutcome, AuthError>`. The public methods
//! below are the only place errors become outcomes, and the only place they
//! are logged.

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::config::{AuthConfig, StrategyPolicy};
use super::error::{AuthError, DenialReason};
use super::notifier::Notifier;
use super::otp::{codes_match, is_valid_otp, is_valid_session_id};
use super::outcome::{EntryPoint, LoginOutcome};
use super::password::{verify_dummy_password_blocking, verify_password_blocking};
use super::roles::{Role, RoleDirectory};
use super::session::SessionStore;
use super::strategy::{LoginStrategy, OtpStrategy, PasswordStrategy, VerifiedLogin};
use super::users::{UserDirectory, UserRecord};

/// Username or email plus password.
pub struct Credentials {
    pub identity: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selected {
    Password,
    Otp,
}

pub struct Authenticator {
    config: AuthConfig,
    users: Arc<dyn UserDirectory>,
    roles: Arc<RoleDirectory>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserDirectory>,
        roles: Arc<RoleDirectory>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            users,
            roles,
            sessions,
            notifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn roles(&self) -> &Arc<RoleDirectory> {
        &self.roles
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    #[must_use]
    pub fn notifier_available(&self) -> bool {
        self.notifier.is_available()
    }

    /// General entry point: every role except the privileged one.
    #[instrument(skip_all, fields(entry_point = "general"))]
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        let result = self.try_login(credentials, EntryPoint::General).await;
        conclude("login", result)
    }

    /// Privileged entry point: only the privileged role.
    #[instrument(skip_all, fields(entry_point = "privileged"))]
    pub async fn admin_login(&self, credentials: &Credentials) -> LoginOutcome {
        let result = self.try_login(credentials, EntryPoint::Privileged).await;
        conclude("admin_login", result)
    }

    #[instrument(skip(self, session_id, code))]
    pub async fn verify_otp(&self, session_id: &str, user_id: Uuid, code: &str) -> LoginOutcome {
        let result = self.try_verify_otp(session_id, user_id, code).await;
        conclude("verify_otp", result)
    }

    #[instrument(skip(self, session_id))]
    pub async fn resend_otp(&self, session_id: &str, user_id: Uuid) -> LoginOutcome {
        let result = self.try_resend_otp(session_id, user_id).await;
        conclude("resend_otp", result)
    }

    async fn try_login(
        &self,
        credentials: &Credentials,
        entry_point: EntryPoint,
    ) -> Result<LoginOutcome, AuthError> {
        let identity = credentials.identity.trim();
        if identity.is_empty() {
            return Err(AuthError::Validation("identity is required"));
        }
        if credentials.password.expose_secret().is_empty() {
            return Err(AuthError::Validation("password is required"));
        }

        let password = SecretString::from(credentials.password.expose_secret().to_owned());
        let user = match self.lookup(identity).await? {
            Some(user) if !user.is_deleted => user,
            inactive => {
                verify_dummy_password_blocking(password).await?;
                let reason = if inactive.is_some() {
                    DenialReason::DeletedUser
                } else {
                    DenialReason::UnknownUser
                };
                return Err(AuthError::denied(reason));
            }
        };

        let verified = verify_password_blocking(password, user.password_hash.clone()).await?;
        if !verified {
            return Err(AuthError::denied(DenialReason::BadPassword));
        }

        let role = self.partition(&user, entry_point)?;
        let login = VerifiedLogin {
            user: &user,
            role: &role,
            entry_point,
        };

        match self.select_strategy() {
            Selected::Password => PasswordStrategy.authenticate(&login).await,
            Selected::Otp => self.otp_strategy().authenticate(&login).await,
        }
    }

    async fn try_verify_otp(
        &self,
        session_id: &str,
        user_id: Uuid,
        code: &str,
    ) -> Result<LoginOutcome, AuthError> {
        if !is_valid_session_id(session_id) {
            return Err(AuthError::Validation("malformed session_id"));
        }
        if !is_valid_otp(code) {
            return Err(AuthError::Validation("malformed otp code"));
        }

        self.sessions
            .validate_session(session_id, user_id, self.config.otp_ttl())
            .ok_or(AuthError::denied(DenialReason::SessionInvalid))?;
        // Single use whatever the code: a concurrent verify loses here.
        let record = self
            .sessions
            .take_session(session_id)
            .ok_or(AuthError::denied(DenialReason::SessionInvalid))?;

        if !codes_match(&record.otp_code, code) {
            return Err(AuthError::denied(DenialReason::OtpMismatch));
        }

        let (user, role) = self.reload(user_id, record.entry_point).await?;
        let login = VerifiedLogin {
            user: &user,
            role: &role,
            entry_point: record.entry_point,
        };
        PasswordStrategy.authenticate(&login).await
    }

    async fn try_resend_otp(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<LoginOutcome, AuthError> {
        if !is_valid_session_id(session_id) {
            return Err(AuthError::Validation("malformed session_id"));
        }

        self.sessions
            .validate_session(session_id, user_id, self.config.otp_ttl())
            .ok_or(AuthError::denied(DenialReason::SessionInvalid))?;
        let record = self
            .sessions
            .take_session(session_id)
            .ok_or(AuthError::denied(DenialReason::SessionInvalid))?;

        let (user, role) = self.reload(user_id, record.entry_point).await?;
        let login = VerifiedLogin {
            user: &user,
            role: &role,
            entry_point: record.entry_point,
        };

        if !self.notifier.is_available() {
            warn!(
                user_id = %user_id,
                "notifier unavailable during resend, completing login with single factor"
            );
            return PasswordStrategy.authenticate(&login).await;
        }
        self.otp_strategy().authenticate(&login).await
    }

    async fn lookup(&self, identity: &str) -> Result<Option<UserRecord>, AuthError> {
        let user = if identity.contains('@') {
            self.users
                .find_by_email(identity)
                .await
                .context("failed to look up user by email")?
        } else {
            self.users
                .find_by_username(identity)
                .await
                .context("failed to look up user by username")?
        };
        Ok(user)
    }

    /// Load the user again and re-apply the checks from the original login.
    async fn reload(
        &self,
        user_id: Uuid,
        entry_point: EntryPoint,
    ) -> Result<(UserRecord, Role), AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await
            .context("failed to reload user")?
            .ok_or(AuthError::denied(DenialReason::UnknownUser))?;
        if user.is_deleted {
            return Err(AuthError::denied(DenialReason::DeletedUser));
        }
        let role = self.partition(&user, entry_point)?;
        Ok((user, role))
    }

    /// General rejects the privileged role, privileged accepts only it.
    fn partition(&self, user: &UserRecord, entry_point: EntryPoint) -> Result<Role, AuthError> {
        let privileged = self
            .roles
            .get_role(self.config.privileged_role())
            .ok_or(AuthError::denied(DenialReason::UnknownRole))?;
        let role = self
            .roles
            .role_by_id(user.role_id)
            .ok_or(AuthError::denied(DenialReason::UnknownRole))?;

        match (entry_point, role.id == privileged.id) {
            (EntryPoint::General, true) => Err(AuthError::denied(
                DenialReason::PrivilegedRoleOnGeneralEntry,
            )),
            (EntryPoint::Privileged, false) => Err(AuthError::denied(
                DenialReason::NonPrivilegedRoleOnPrivilegedEntry,
            )),
            _ => Ok(role),
        }
    }

    fn select_strategy(&self) -> Selected {
        match self.config.strategy() {
            StrategyPolicy::AlwaysSingleFactor => Selected::Password,
            StrategyPolicy::PreferOtpWithFallback if self.notifier.is_available() => Selected::Otp,
            StrategyPolicy::PreferOtpWithFallback => {
                warn!("notifier unavailable, falling back to single factor");
                Selected::Password
            }
        }
    }

    fn otp_strategy(&self) -> OtpStrategy<'_> {
        OtpStrategy {
            sessions: self.sessions.as_ref(),
            notifier: self.notifier.as_ref(),
            otp_ttl: self.config.otp_ttl(),
            dispatch_timeout: self.config.notifier_timeout(),
        }
    }
}

fn conclude(operation: &'static str, result: Result<LoginOutcome, AuthError>) -> LoginOutcome {
    match result {
        Ok(outcome) => {
            info!(operation, outcome = outcome.kind(), "auth operation completed");
            outcome
        }
        Err(AuthError::Validation(reason)) => {
            info!(operation, reason, "auth request rejected");
            LoginOutcome::Invalid
        }
        Err(AuthError::Denied(reason)) => {
            info!(operation, reason = reason.as_str(), "authentication denied");
            LoginOutcome::Denied
        }
        Err(AuthError::Dispatch(detail)) => {
            error!(operation, "otp dispatch failed: {detail}");
            LoginOutcome::Denied
        }
        Err(AuthError::Internal(err)) => {
            error!(operation, "auth internal fault: {err:#}");
            LoginOutcome::Fault
        }
    }
}
