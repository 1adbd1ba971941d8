//! Authentication policy knobs.

use std::time::Duration;

const DEFAULT_OTP_TTL_SECONDS: u64 = 5 * 60;
const DEFAULT_SESSION_SWEEP_SECONDS: u64 = 60;
const DEFAULT_ROLE_REFRESH_SECONDS: u64 = 5 * 60;
const DEFAULT_NOTIFIER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PRIVILEGED_ROLE: &str = "admin";

/// How a verified login is completed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrategyPolicy {
    /// Never challenge; issue claims right after the password check.
    AlwaysSingleFactor,
    /// Challenge with an OTP, falling back to single factor while the
    /// notifier is unavailable.
    #[default]
    PreferOtpWithFallback,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    otp_ttl: Duration,
    session_sweep_interval: Duration,
    role_refresh_interval: Duration,
    notifier_timeout: Duration,
    privileged_role: String,
    strategy: StrategyPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL_SECONDS),
            session_sweep_interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_SECONDS),
            role_refresh_interval: Duration::from_secs(DEFAULT_ROLE_REFRESH_SECONDS),
            notifier_timeout: Duration::from_millis(DEFAULT_NOTIFIER_TIMEOUT_MS),
            privileged_role: DEFAULT_PRIVILEGED_ROLE.to_string(),
            strategy: StrategyPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: u64) -> Self {
        self.otp_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_session_sweep_seconds(mut self, seconds: u64) -> Self {
        self.session_sweep_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_role_refresh_seconds(mut self, seconds: u64) -> Self {
        self.role_refresh_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_notifier_timeout_ms(mut self, millis: u64) -> Self {
        self.notifier_timeout = Duration::from_millis(millis);
        self
    }

    #[must_use]
    pub fn with_privileged_role(mut self, role: String) -> Self {
        self.privileged_role = role;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyPolicy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn otp_ttl(&self) -> Duration {
        self.otp_ttl
    }

    #[must_use]
    pub fn session_sweep_interval(&self) -> Duration {
        self.session_sweep_interval
    }

    #[must_use]
    pub fn role_refresh_interval(&self) -> Duration {
        self.role_refresh_interval
    }

    #[must_use]
    pub fn notifier_timeout(&self) -> Duration {
        self.notifier_timeout
    }

    #[must_use]
    pub fn privileged_role(&self) -> &str {
        &self.privileged_role
    }

    #[must_use]
    pub fn strategy(&self) -> StrategyPolicy {
        self.strategy
    }
}
