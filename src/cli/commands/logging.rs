use anyhow::Result;
use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_FORMAT: &str = "log-format";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// `None` leaves the default (errors only).
    pub level: Option<Level>,
    pub format: LogFormat,
}

impl Options {
    /// # Errors
    /// Returns an error if the log format is unknown.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let verbosity = matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0);
        let format = match matches.get_one::<String>(ARG_LOG_FORMAT).map(String::as_str) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("unknown log format: {other}"),
        };

        Ok(Self {
            level: level_for(verbosity),
            format,
        })
    }
}

const fn level_for(verbosity: u8) -> Option<Level> {
    match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Accepts `0..=5` or a level name.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("WARDEN_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long("log-format")
                .help("Log output: pretty for terminals, json for collectors")
                .env("WARDEN_LOG_FORMAT")
                .global(true)
                .value_parser(["pretty", "json"])
                .default_value("pretty"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options> {
        let command = with_args(Command::new("warden"));
        let matches = command.try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0), None);
        assert_eq!(level_for(1), Some(Level::WARN));
        assert_eq!(level_for(3), Some(Level::DEBUG));
        assert_eq!(level_for(9), Some(Level::TRACE));
    }

    #[test]
    fn defaults_to_pretty_errors() -> Result<()> {
        temp_env::with_vars_unset(["WARDEN_LOG_LEVEL", "WARDEN_LOG_FORMAT"], || {
            let options = parse(&["warden"])?;
            assert_eq!(options.level, None);
            assert_eq!(options.format, LogFormat::Pretty);
            Ok(())
        })
    }

    #[test]
    fn flags_select_level_and_format() -> Result<()> {
        temp_env::with_vars_unset(["WARDEN_LOG_LEVEL", "WARDEN_LOG_FORMAT"], || {
            let options = parse(&["warden", "-vv", "--log-format", "json"])?;
            assert_eq!(options.level, Some(Level::INFO));
            assert_eq!(options.format, LogFormat::Json);
            Ok(())
        })
    }

    #[test]
    fn format_from_env() -> Result<()> {
        temp_env::with_vars(
            [("WARDEN_LOG_FORMAT", Some("json")), ("WARDEN_LOG_LEVEL", None)],
            || {
                assert_eq!(parse(&["warden"])?.format, LogFormat::Json);
                Ok(())
            },
        )
    }

    #[test]
    fn unknown_format_is_rejected() {
        temp_env::with_vars_unset(["WARDEN_LOG_LEVEL", "WARDEN_LOG_FORMAT"], || {
            assert!(parse(&["warden", "--log-format", "xml"]).is_err());
        });
    }
}
