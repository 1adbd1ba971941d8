//! Out-of-band OTP delivery.
//!
//! `LogNotifier` is the development sender: it is always available and logs a
//! masked code. `HttpNotifier` posts `{to, username, code}` to a mail relay and
//! tracks relay health through a background probe, so strategy selection can
//! read availability without a network round-trip.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::BoxFuture;
use crate::APP_USER_AGENT;

/// Who receives a code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
}

pub trait Notifier: Send + Sync {
    /// Last known availability of the delivery channel.
    fn is_available(&self) -> bool;

    /// Deliver `code` to `recipient`. `Ok` means the channel accepted it.
    fn send_otp_code<'a>(
        &'a self,
        recipient: &'a Recipient,
        code: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Show only the last two digits.
#[must_use]
pub fn mask_code(code: &str) -> String {
    let keep = code.len().saturating_sub(2);
    code.char_indices()
        .map(|(i, c)| if i < keep { '*' } else { c })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn is_available(&self) -> bool {
        true
    }

    fn send_otp_code<'a>(
        &'a self,
        recipient: &'a Recipient,
        code: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!(
                user_id = %recipient.user_id,
                to = %recipient.email,
                code = %mask_code(code),
                "otp dispatch stub"
            );
            Ok(())
        })
    }
}

#[derive(Serialize)]
struct OtpMessage<'a> {
    to: &'a str,
    username: &'a str,
    code: &'a str,
}

#[derive(Debug)]
pub struct HttpNotifier {
    client: Client,
    send_url: Url,
    health_url: Url,
    available: AtomicBool,
}

impl HttpNotifier {
    /// Unavailable until the first successful probe.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(send_url: Url, health_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build notifier http client")?;
        Ok(Self {
            client,
            send_url,
            health_url,
            available: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    /// Check relay health and update the availability flag.
    pub async fn probe(&self) -> bool {
        let healthy = match self.client.get(self.health_url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("notifier health probe failed: {err}");
                false
            }
        };

        let was = self.available.swap(healthy, Ordering::Relaxed);
        if was && !healthy {
            warn!(url = %self.health_url, "notifier became unavailable");
        } else if !was && healthy {
            info!(url = %self.health_url, "notifier available");
        }
        healthy
    }
}

impl Notifier for HttpNotifier {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn send_otp_code<'a>(
        &'a self,
        recipient: &'a Recipient,
        code: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.post_code(recipient, code))
    }
}

impl HttpNotifier {
    #[instrument(skip(self, code), fields(user_id = %recipient.user_id))]
    async fn post_code(&self, recipient: &Recipient, code: &str) -> Result<()> {
        let message = OtpMessage {
            to: &recipient.email,
            username: &recipient.username,
            code,
        };
        self.client
            .post(self.send_url.clone())
            .json(&message)
            .send()
            .await
            .context("failed to reach notifier")?
            .error_for_status()
            .context("notifier rejected otp")?;
        Ok(())
    }
}

/// `<url>/health`, keeping any base path.
#[must_use]
pub fn default_health_url(url: &Url) -> Url {
    let mut health = url.clone();
    let path = format!("{}/health", url.path().trim_end_matches('/'));
    health.set_path(&path);
    health.set_query(None);
    health
}

/// Probe the relay immediately, then every `every`.
pub fn spawn_notifier_health_probe(notifier: Arc<HttpNotifier>, every: Duration) -> JoinHandle<()> {
    let every = if every.is_zero() {
        Duration::from_secs(1)
    } else {
        every
    };
    tokio::spawn(async move {
        loop {
            notifier.probe().await;
            sleep(every).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Extension, Json, Router,
    };
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    type Inbox = Arc<Mutex<Vec<Value>>>;

    async fn relay(healthy: bool) -> anyhow::Result<(Url, Inbox)> {
        let inbox: Inbox = Arc::default();
        let health_status = if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        let app = Router::new()
            .route(
                "/send",
                post(|Extension(inbox): Extension<Inbox>, Json(body): Json<Value>| async move {
                    if let Ok(mut messages) = inbox.lock() {
                        messages.push(body);
                    }
                    StatusCode::ACCEPTED
                }),
            )
            .route("/health", get(move || async move { health_status }))
            .layer(Extension(inbox.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok((Url::parse(&format!("http://{addr}/send"))?, inbox))
    }

    fn recipient() -> Recipient {
        Recipient {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn mask_code_keeps_last_two_digits() {
        assert_eq!(mask_code("12345678"), "******78");
        assert_eq!(mask_code("7"), "7");
        assert_eq!(mask_code(""), "");
    }

    #[test]
    fn default_health_url_appends_segment() -> anyhow::Result<()> {
        let url = Url::parse("https://relay.test/api/otp/")?;
        assert_eq!(default_health_url(&url).as_str(), "https://relay.test/api/otp/health");
        let url = Url::parse("http://relay.test")?;
        assert_eq!(default_health_url(&url).as_str(), "http://relay.test/health");
        Ok(())
    }

    #[tokio::test]
    async fn log_notifier_is_always_available() -> anyhow::Result<()> {
        let notifier = LogNotifier;
        assert!(notifier.is_available());
        notifier.send_otp_code(&recipient(), "12345678").await?;
        Ok(())
    }

    #[tokio::test]
    async fn http_notifier_posts_code_and_tracks_health() -> anyhow::Result<()> {
        let (send_url, inbox) = relay(true).await?;
        let health = send_url.join("/health")?;
        let notifier = HttpNotifier::new(send_url, health, Duration::from_secs(2))?;

        assert!(!notifier.is_available());
        assert!(notifier.probe().await);
        assert!(notifier.is_available());

        notifier.send_otp_code(&recipient(), "01234567").await?;
        let messages = inbox.lock().map(|m| m.clone()).unwrap_or_default();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["to"], "alice@example.com");
        assert_eq!(messages[0]["username"], "alice");
        assert_eq!(messages[0]["code"], "01234567");
        Ok(())
    }

    #[tokio::test]
    async fn http_notifier_unhealthy_relay_is_unavailable() -> anyhow::Result<()> {
        let (send_url, _inbox) = relay(false).await?;
        let health = send_url.join("/health")?;
        let notifier = HttpNotifier::new(send_url, health, Duration::from_secs(2))?;
        assert!(!notifier.probe().await);
        assert!(!notifier.is_available());
        Ok(())
    }

    #[tokio::test]
    async fn http_notifier_send_fails_when_relay_is_down() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/send"))?;
        let notifier = HttpNotifier::new(url.clone(), default_health_url(&url), Duration::from_millis(500))?;
        assert!(!notifier.probe().await);
        assert!(notifier.send_otp_code(&recipient(), "01234567").await.is_err());
        Ok(())
    }
}
