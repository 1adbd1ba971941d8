//! # Warden (credential login and OTP challenges)
//!
//! `warden` turns a credential into either an immediately signed token or a
//! short-lived one-time-password (OTP) challenge delivered out-of-band.
//!
//! ## Entry Points
//!
//! Two login entry points share one pipeline with opposite role filters:
//!
//! - **General** (`/v1/auth/login`) rejects the privileged administrative role.
//! - **Privileged** (`/v1/auth/admin/login`) accepts only that role.
//!
//! The partition holds regardless of password correctness, so a privileged
//! account is never reachable through the general endpoint and vice versa.
//!
//! ## Second Factor
//!
//! When second factor is enabled and the notifier is healthy, a successful
//! password check yields an OTP challenge bound to a `session_id`. The code is
//! verified (or resent) against the in-memory session store, which burns a
//! session on any invalid access and sweeps expired records in the background.
//! A notifier outage degrades to single-factor login instead of denying
//! everyone.
//!
//! ## Failure Shape
//!
//! Every denial returns the same `authenticated=false` body. Causes are only
//! distinguished in server-side logs to prevent user enumeration.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
