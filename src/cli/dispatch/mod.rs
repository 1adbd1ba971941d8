use crate::cli::{
    actions::{server::Args, Action},
    commands::{self, auth, notifier, token},
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        auth: auth::Options::parse(matches)?,
        notifier: notifier::Options::parse(matches)?,
        token: token::Options::parse(matches)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action() -> Result<()> {
        let action = temp_env::with_vars(
            [
                ("WARDEN_DSN", Some("postgres://localhost/warden")),
                ("WARDEN_PORT", None),
                ("WARDEN_NOTIFIER_URL", Some("http://relay.local/send")),
                ("WARDEN_TOKEN_FIELDS", None),
            ],
            || {
                let matches = commands::new().try_get_matches_from(vec!["warden"])?;
                handler(&matches)
            },
        )?;

        let Action::Server(args) = action;
        assert_eq!(args.port, 8080);
        assert_eq!(args.dsn.expose_secret(), "postgres://localhost/warden");
        assert!(args.notifier.url.is_some());
        assert!(!format!("{args:?}").contains("postgres://localhost/warden"));
        Ok(())
    }
}
