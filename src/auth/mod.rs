//! Authentication core: credential checks, role partitioning, OTP challenges.
//!
//! Flow Overview:
//! 1) Look up the user by username or email and verify the Argon2 hash.
//! 2) Apply the role partition for the entry point (general vs privileged).
//! 3) Pick a strategy: password-only, or an OTP challenge when the notifier is up.
//! 4) OTP challenges are verified or resent against the session store.
//! 5) The transport hands `Authenticated` claims to the token issuer.
//!
//! Security boundaries:
//! - Any invalid session access burns the session; there is no retry window.
//! - A pending login is only stored after the notifier confirmed dispatch.
//! - Denials are indistinguishable to callers; the reason is logged only.

pub mod authenticator;
pub mod config;
pub mod error;
pub mod notifier;
pub mod otp;
pub mod outcome;
pub mod password;
pub mod roles;
pub mod session;
pub(crate) mod strategy;
pub mod token;
pub mod users;

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by the object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use authenticator::{Authenticator, Credentials};
pub use config::{AuthConfig, StrategyPolicy};
pub use error::{AuthError, DenialReason};
pub use notifier::{HttpNotifier, LogNotifier, Notifier, Recipient};
pub use outcome::{AuthenticatedClaims, EntryPoint, LoginOutcome, OtpChallenge};
pub use roles::{PgRoleSource, Role, RoleDirectory, RoleSource};
pub use session::{MemorySessionStore, PendingLogin, SessionStore};
pub use token::{IssuedToken, TokenIssuer, TokenNaming};
pub use users::{PgUserDirectory, UserDirectory, UserRecord};
