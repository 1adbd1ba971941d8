use crate::auth::{token::DEFAULT_TOKEN_FIELD, TokenNaming};
use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_TOKEN_AUDIENCE: &str = "token-audience";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_TOKEN_SIGNING_SEED: &str = "token-signing-seed";
pub const ARG_TOKEN_FIELD: &str = "token-field";
pub const ARG_DEFAULT_TOKEN_FIELD: &str = "default-token-field";

#[derive(Debug)]
pub struct Options {
    pub issuer: String,
    pub audience: String,
    pub ttl_seconds: i64,
    /// Base64 Ed25519 seed; a random key is generated when absent.
    pub signing_seed: Option<SecretString>,
    pub naming: TokenNaming,
}

impl Options {
    /// Parse token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a `username=field` mapping or the default field is invalid.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mappings = matches
            .get_many::<String>(ARG_TOKEN_FIELD)
            .into_iter()
            .flatten()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| TokenNaming::parse_mapping(raw))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid --{ARG_TOKEN_FIELD}"))?;

        let default_field =
            get_non_empty(ARG_DEFAULT_TOKEN_FIELD).unwrap_or_else(|| DEFAULT_TOKEN_FIELD.to_string());
        let naming = TokenNaming::new(&default_field, mappings)
            .with_context(|| format!("invalid --{ARG_DEFAULT_TOKEN_FIELD} or --{ARG_TOKEN_FIELD}"))?;

        Ok(Self {
            issuer: get_non_empty(ARG_TOKEN_ISSUER).unwrap_or_else(|| "warden".to_string()),
            audience: get_non_empty(ARG_TOKEN_AUDIENCE).unwrap_or_else(|| "warden".to_string()),
            ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(3600),
            signing_seed: get_non_empty(ARG_TOKEN_SIGNING_SEED).map(SecretString::from),
            naming,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long(ARG_TOKEN_ISSUER)
                .help("Issuer claim of signed tokens")
                .env("WARDEN_TOKEN_ISSUER")
                .default_value("warden"),
        )
        .arg(
            Arg::new(ARG_TOKEN_AUDIENCE)
                .long(ARG_TOKEN_AUDIENCE)
                .help("Audience claim of signed tokens")
                .env("WARDEN_TOKEN_AUDIENCE")
                .default_value("warden"),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Lifetime of signed tokens in seconds")
                .env("WARDEN_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TOKEN_SIGNING_SEED)
                .long(ARG_TOKEN_SIGNING_SEED)
                .help("Base64 32-byte Ed25519 seed (default: random per process)")
                .env("WARDEN_TOKEN_SIGNING_SEED")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_FIELD)
                .long(ARG_TOKEN_FIELD)
                .help("Response field for a user's token, as username=field (repeatable)")
                .env("WARDEN_TOKEN_FIELDS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_DEFAULT_TOKEN_FIELD)
                .long(ARG_DEFAULT_TOKEN_FIELD)
                .help("Response field for tokens of unmapped users")
                .env("WARDEN_DEFAULT_TOKEN_FIELD")
                .default_value(DEFAULT_TOKEN_FIELD),
        )
}
