use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_NOTIFIER_URL: &str = "notifier-url";
pub const ARG_NOTIFIER_HEALTH_URL: &str = "notifier-health-url";
pub const ARG_NOTIFIER_TIMEOUT_MS: &str = "notifier-timeout-ms";
pub const ARG_NOTIFIER_HEALTH_SECONDS: &str = "notifier-health-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    /// Mail relay endpoint; `None` selects the log notifier.
    pub url: Option<Url>,
    pub health_url: Option<Url>,
    pub timeout_ms: u64,
    pub health_seconds: u64,
}

impl Options {
    /// Parse notifier arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a URL does not parse, or a health URL is given without a relay URL.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_url = |id: &str| -> anyhow::Result<Option<Url>> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| Url::parse(v).with_context(|| format!("invalid --{id}")))
                .transpose()
        };

        let url = get_url(ARG_NOTIFIER_URL)?;
        let health_url = get_url(ARG_NOTIFIER_HEALTH_URL)?;
        if url.is_none() && health_url.is_some() {
            anyhow::bail!("--{ARG_NOTIFIER_HEALTH_URL} requires --{ARG_NOTIFIER_URL}");
        }

        Ok(Self {
            url,
            health_url,
            timeout_ms: matches
                .get_one::<u64>(ARG_NOTIFIER_TIMEOUT_MS)
                .copied()
                .unwrap_or(5000),
            health_seconds: matches
                .get_one::<u64>(ARG_NOTIFIER_HEALTH_SECONDS)
                .copied()
                .unwrap_or(30),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_NOTIFIER_URL)
                .long(ARG_NOTIFIER_URL)
                .help("Mail relay URL receiving OTP codes; codes are only logged when unset")
                .env("WARDEN_NOTIFIER_URL"),
        )
        .arg(
            Arg::new(ARG_NOTIFIER_HEALTH_URL)
                .long(ARG_NOTIFIER_HEALTH_URL)
                .help("Mail relay health URL (default: <notifier-url>/health)")
                .env("WARDEN_NOTIFIER_HEALTH_URL"),
        )
        .arg(
            Arg::new(ARG_NOTIFIER_TIMEOUT_MS)
                .long(ARG_NOTIFIER_TIMEOUT_MS)
                .help("Timeout for a single OTP dispatch in milliseconds")
                .env("WARDEN_NOTIFIER_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_NOTIFIER_HEALTH_SECONDS)
                .long(ARG_NOTIFIER_HEALTH_SECONDS)
                .help("Interval between mail relay health probes in seconds")
                .env("WARDEN_NOTIFIER_HEALTH_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
