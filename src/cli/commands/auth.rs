use crate::auth::{AuthConfig, StrategyPolicy};
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_SESSION_SWEEP_SECONDS: &str = "session-sweep-seconds";
pub const ARG_ROLE_REFRESH_SECONDS: &str = "role-refresh-seconds";
pub const ARG_PRIVILEGED_ROLE: &str = "privileged-role";
pub const ARG_SINGLE_FACTOR: &str = "single-factor";

#[derive(Debug, Clone)]
pub struct Options {
    pub otp_ttl_seconds: u64,
    pub session_sweep_seconds: u64,
    pub role_refresh_seconds: u64,
    pub privileged_role: String,
    pub single_factor: bool,
}

impl Options {
    /// Parse login policy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the privileged role name is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let seconds = |id: &str| matches.get_one::<u64>(id).copied();

        let privileged_role = matches
            .get_one::<String>(ARG_PRIVILEGED_ROLE)
            .map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_PRIVILEGED_ROLE}"))?;

        Ok(Self {
            otp_ttl_seconds: seconds(ARG_OTP_TTL_SECONDS).unwrap_or(300),
            session_sweep_seconds: seconds(ARG_SESSION_SWEEP_SECONDS).unwrap_or(60),
            role_refresh_seconds: seconds(ARG_ROLE_REFRESH_SECONDS).unwrap_or(300),
            privileged_role,
            single_factor: matches.get_flag(ARG_SINGLE_FACTOR),
        })
    }

    /// Build the core configuration; the dispatch timeout lives with the notifier flags.
    #[must_use]
    pub fn to_config(&self, notifier_timeout_ms: u64) -> AuthConfig {
        let strategy = if self.single_factor {
            StrategyPolicy::AlwaysSingleFactor
        } else {
            StrategyPolicy::PreferOtpWithFallback
        };

        AuthConfig::new()
            .with_otp_ttl_seconds(self.otp_ttl_seconds)
            .with_session_sweep_seconds(self.session_sweep_seconds)
            .with_role_refresh_seconds(self.role_refresh_seconds)
            .with_notifier_timeout_ms(notifier_timeout_ms)
            .with_privileged_role(self.privileged_role.clone())
            .with_strategy(strategy)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("Lifetime of a pending OTP challenge in seconds")
                .env("WARDEN_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_SWEEP_SECONDS)
                .long(ARG_SESSION_SWEEP_SECONDS)
                .help("Interval between expired-session sweeps in seconds")
                .env("WARDEN_SESSION_SWEEP_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ROLE_REFRESH_SECONDS)
                .long(ARG_ROLE_REFRESH_SECONDS)
                .help("Interval between role cache refreshes in seconds")
                .env("WARDEN_ROLE_REFRESH_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PRIVILEGED_ROLE)
                .long(ARG_PRIVILEGED_ROLE)
                .help("Role accepted only by the admin login endpoint")
                .env("WARDEN_PRIVILEGED_ROLE")
                .default_value("admin"),
        )
        .arg(
            Arg::new(ARG_SINGLE_FACTOR)
                .long(ARG_SINGLE_FACTOR)
                .help("Never send OTP challenges, complete logins after the password check")
                .env("WARDEN_SINGLE_FACTOR")
                .action(ArgAction::SetTrue),
        )
}
