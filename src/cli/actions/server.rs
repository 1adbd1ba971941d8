use crate::{
    api,
    auth::{
        notifier::{default_health_url, spawn_notifier_health_probe},
        roles::spawn_role_refresher,
        session::spawn_session_sweeper,
        Authenticator, HttpNotifier, LogNotifier, MemorySessionStore, Notifier, PgRoleSource,
        PgUserDirectory, RoleDirectory, SessionStore, TokenIssuer,
    },
    cli::{
        commands::{auth, notifier, token},
        telemetry,
    },
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub auth: auth::Options,
    pub notifier: notifier::Options,
    pub token: token::Options,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the database is unreachable, the token settings are
/// invalid, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(args.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let config = args.auth.to_config(args.notifier.timeout_ms);
    let mut background = Vec::new();

    let notifier: Arc<dyn Notifier> = match &args.notifier.url {
        Some(url) => {
            let health_url = args
                .notifier
                .health_url
                .clone()
                .unwrap_or_else(|| default_health_url(url));
            let http = Arc::new(HttpNotifier::new(
                url.clone(),
                health_url,
                config.notifier_timeout(),
            )?);
            background.push(spawn_notifier_health_probe(
                http.clone(),
                Duration::from_secs(args.notifier.health_seconds),
            ));
            http
        }
        None => {
            warn!("No notifier URL configured, OTP codes are only written to the log");
            Arc::new(LogNotifier)
        }
    };

    // Startup continues with an empty cache; /health reports it until a refresh succeeds.
    let roles = Arc::new(RoleDirectory::new(Arc::new(PgRoleSource::new(pool.clone()))));
    match roles.refresh().await {
        Ok(count) => info!(count, "Role cache loaded"),
        Err(err) => error!("Failed to load roles: {err:#}"),
    }
    background.push(spawn_role_refresher(
        roles.clone(),
        config.role_refresh_interval(),
    ));

    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    background.push(spawn_session_sweeper(
        sessions.clone(),
        config.otp_ttl(),
        config.session_sweep_interval(),
    ));

    let issuer = Arc::new(build_issuer(args.token)?);
    info!(kid = issuer.key_id(), "Token signing key ready");

    let authenticator = Arc::new(Authenticator::new(
        config,
        Arc::new(PgUserDirectory::new(pool.clone())),
        roles,
        sessions,
        notifier,
    ));

    let result = api::new(args.port, pool, authenticator, issuer, background).await;
    telemetry::shutdown_tracer();
    result
}

fn build_issuer(options: token::Options) -> Result<TokenIssuer> {
    let signing_key = match &options.signing_seed {
        Some(seed) => TokenIssuer::signing_key_from_seed(seed.expose_secret())
            .context("invalid --token-signing-seed")?,
        None => {
            warn!("No signing seed configured, tokens will not verify after a restart");
            TokenIssuer::random_signing_key()
        }
    };

    TokenIssuer::new(
        signing_key,
        options.issuer,
        options.audience,
        options.ttl_seconds,
        options.naming,
    )
    .context("invalid token settings")
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        otp_ttl_seconds = args.auth.otp_ttl_seconds,
        privileged_role = %args.auth.privileged_role,
        single_factor = args.auth.single_factor,
        notifier = args.notifier.url.as_ref().map_or("log", |_| "http"),
        token_ttl_seconds = args.token.ttl_seconds,
        "Starting warden"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedClaims, TokenNaming};
    use uuid::Uuid;

    fn options(seed: Option<&str>) -> token::Options {
        token::Options {
            issuer: "warden".to_string(),
            audience: "clients".to_string(),
            ttl_seconds: 60,
            signing_seed: seed.map(|s| SecretString::from(s.to_string())),
            naming: TokenNaming::default(),
        }
    }

    #[test]
    fn seeded_issuer_is_stable() -> Result<()> {
        // 32 zero bytes.
        let seed = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
        let first = build_issuer(options(Some(seed)))?;
        let second = build_issuer(options(Some(seed)))?;
        assert_eq!(first.key_id(), second.key_id());

        let claims = AuthenticatedClaims {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: "user".to_string(),
            image_url: None,
        };
        let issued = first.issue(&claims)?;
        assert_eq!(second.verify(&issued.token)?.aud, "clients");
        Ok(())
    }

    #[test]
    fn bad_seed_is_rejected() {
        assert!(build_issuer(options(Some("c2hvcnQ="))).is_err());
    }
}
