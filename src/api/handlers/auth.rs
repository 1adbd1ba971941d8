//! Login, OTP verification and OTP resend endpoints.
//!
//! Every handler funnels its `LoginOutcome` through `respond`, so all
//! non-success responses share one body regardless of the cause.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{
    DeniedResponse, LoginRequest, OtpChallengeResponse, ResendOtpRequest, TokenResponse,
    VerifyOtpRequest,
};
use crate::auth::{Authenticator, Credentials, IssuedToken, LoginOutcome, TokenIssuer};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 202, description = "OTP challenge issued", body = OtpChallengeResponse),
        (status = 400, description = "Malformed request", body = DeniedResponse),
        (status = 401, description = "Denied", body = DeniedResponse),
        (status = 500, description = "Internal error", body = DeniedResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    auth: Extension<Arc<Authenticator>>,
    tokens: Extension<Arc<TokenIssuer>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return denied(StatusCode::BAD_REQUEST);
    };

    let credentials = Credentials::new(request.identity, request.password);
    let outcome = auth.login(&credentials).await;
    respond(outcome, &tokens)
}

#[utoipa::path(
    post,
    path = "/v1/auth/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 202, description = "OTP challenge issued", body = OtpChallengeResponse),
        (status = 400, description = "Malformed request", body = DeniedResponse),
        (status = 401, description = "Denied", body = DeniedResponse),
        (status = 500, description = "Internal error", body = DeniedResponse)
    ),
    tag = "auth"
)]
pub async fn admin_login(
    auth: Extension<Arc<Authenticator>>,
    tokens: Extension<Arc<TokenIssuer>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return denied(StatusCode::BAD_REQUEST);
    };

    let credentials = Credentials::new(request.identity, request.password);
    let outcome = auth.admin_login(&credentials).await;
    respond(outcome, &tokens)
}

#[utoipa::path(
    post,
    path = "/v1/auth/otp/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 400, description = "Malformed request", body = DeniedResponse),
        (status = 401, description = "Denied", body = DeniedResponse),
        (status = 500, description = "Internal error", body = DeniedResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    auth: Extension<Arc<Authenticator>>,
    tokens: Extension<Arc<TokenIssuer>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return denied(StatusCode::BAD_REQUEST);
    };

    let outcome = auth
        .verify_otp(&request.session_id, request.user_id, &request.code)
        .await;
    respond(outcome, &tokens)
}

#[utoipa::path(
    post,
    path = "/v1/auth/otp/resend",
    request_body = ResendOtpRequest,
    responses(
        (status = 200, description = "Authenticated (notifier unavailable)", body = TokenResponse),
        (status = 202, description = "New OTP challenge issued", body = OtpChallengeResponse),
        (status = 400, description = "Malformed request", body = DeniedResponse),
        (status = 401, description = "Denied", body = DeniedResponse),
        (status = 500, description = "Internal error", body = DeniedResponse)
    ),
    tag = "auth"
)]
pub async fn resend_otp(
    auth: Extension<Arc<Authenticator>>,
    tokens: Extension<Arc<TokenIssuer>>,
    payload: Option<Json<ResendOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return denied(StatusCode::BAD_REQUEST);
    };

    let outcome = auth
        .resend_otp(&request.session_id, request.user_id)
        .await;
    respond(outcome, &tokens)
}

fn respond(outcome: LoginOutcome, tokens: &TokenIssuer) -> Response {
    debug!(outcome = outcome.kind(), "login outcome");

    match outcome {
        LoginOutcome::Authenticated(claims) => match tokens.issue(&claims) {
            Ok(issued) => (StatusCode::OK, Json(token_body(&issued))).into_response(),
            Err(err) => {
                error!(user_id = %claims.user_id, "Failed to sign token: {err}");
                denied(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
        LoginOutcome::OtpRequired(challenge) => (
            StatusCode::ACCEPTED,
            Json(OtpChallengeResponse::from(&challenge)),
        )
            .into_response(),
        LoginOutcome::Denied => denied(StatusCode::UNAUTHORIZED),
        LoginOutcome::Invalid => denied(StatusCode::BAD_REQUEST),
        LoginOutcome::Fault => denied(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

// The field name comes from the naming table, which rejects reserved keys.
fn token_body(issued: &IssuedToken) -> Value {
    let mut body = Map::new();
    body.insert(issued.field_name.clone(), Value::from(issued.token.as_str()));
    body.insert("expires_at".to_string(), Value::from(issued.expires_at.as_str()));
    body.insert("authenticated".to_string(), Value::Bool(true));
    body.insert("otp_required".to_string(), Value::Bool(false));
    Value::Object(body)
}

fn denied(status: StatusCode) -> Response {
    (status, Json(DeniedResponse::new())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        password::hash_password, AuthConfig, BoxFuture, MemorySessionStore,
        Notifier, Recipient, Role, RoleDirectory, RoleSource, StrategyPolicy, TokenNaming,
        UserDirectory, UserRecord,
    };
    use anyhow::{Context, Result};
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        routing::post,
        Router,
    };
    use std::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct Users(Vec<UserRecord>);

    impl UserDirectory for Users {
        fn find_by_username<'a>(
            &'a self,
            username: &'a str,
        ) -> BoxFuture<'a, Result<Option<UserRecord>>> {
            Box::pin(async move { Ok(self.0.iter().find(|u| u.username == username).cloned()) })
        }

        fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>> {
            Box::pin(async move {
                Ok(self
                    .0
                    .iter()
                    .find(|u| u.email.eq_ignore_ascii_case(email))
                    .cloned())
            })
        }

        fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<UserRecord>>> {
            Box::pin(async move { Ok(self.0.iter().find(|u| u.id == id).cloned()) })
        }
    }

    struct Roles(Vec<Role>);

    impl RoleSource for Roles {
        fn list_roles(&self) -> BoxFuture<'_, Result<Vec<Role>>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<String>>);

    impl Notifier for Inbox {
        fn is_available(&self) -> bool {
            true
        }

        fn send_otp_code<'a>(
            &'a self,
            _recipient: &'a Recipient,
            code: &'a str,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                if let Ok(mut inbox) = self.0.lock() {
                    inbox.push(code.to_string());
                }
                Ok(())
            })
        }
    }

    struct Fixture {
        app: Router,
        inbox: Arc<Inbox>,
        issuer: Arc<TokenIssuer>,
    }

    async fn fixture(policy: StrategyPolicy, naming: TokenNaming) -> Result<Fixture> {
        let user_role = Role {
            id: Uuid::new_v4(),
            name: "user".to_string(),
        };
        let admin_role = Role {
            id: Uuid::new_v4(),
            name: "admin".to_string(),
        };
        let hash = hash_password("s3cret")?;
        let users = Users(vec![
            UserRecord {
                id: Uuid::new_v4(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: hash.clone(),
                role_id: user_role.id,
                image_url: None,
                is_deleted: false,
            },
            UserRecord {
                id: Uuid::new_v4(),
                username: "root".to_string(),
                email: "root@example.com".to_string(),
                password_hash: hash,
                role_id: admin_role.id,
                image_url: None,
                is_deleted: false,
            },
        ]);

        let roles = Arc::new(RoleDirectory::new(Arc::new(Roles(vec![
            user_role, admin_role,
        ]))));
        roles.refresh().await?;

        let inbox = Arc::new(Inbox::default());
        let notifier: Arc<dyn Notifier> = inbox.clone();
        let authenticator = Arc::new(Authenticator::new(
            AuthConfig::new().with_strategy(policy),
            Arc::new(users),
            roles,
            Arc::new(MemorySessionStore::new()),
            notifier,
        ));
        let issuer = Arc::new(TokenIssuer::new(
            TokenIssuer::random_signing_key(),
            "warden".to_string(),
            "warden".to_string(),
            3600,
            naming,
        )?);

        let app = Router::new()
            .route("/v1/auth/login", post(login))
            .route("/v1/auth/admin/login", post(admin_login))
            .route("/v1/auth/otp/verify", post(verify_otp))
            .route("/v1/auth/otp/resend", post(resend_otp))
            .layer(Extension(authenticator))
            .layer(Extension(issuer.clone()));

        Ok(Fixture { app, inbox, issuer })
    }

    async fn post_json(app: &Router, uri: &str, body: &Value) -> Result<(StatusCode, Value)> {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(body)?))?,
            )
            .await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    #[tokio::test]
    async fn single_factor_login_returns_token() -> Result<()> {
        let fx = fixture(StrategyPolicy::AlwaysSingleFactor, TokenNaming::default()).await?;
        let (status, body) = post_json(
            &fx.app,
            "/v1/auth/login",
            &serde_json::json!({"username": "alice", "password": "s3cret"}),
        )
        .await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["authenticated"], Value::Bool(true));
        assert_eq!(body["otp_required"], Value::Bool(false));
        let token = body["access_token"].as_str().context("access_token")?;
        let claims = fx.issuer.verify(token)?;
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, "user");
        Ok(())
    }

    #[tokio::test]
    async fn naming_table_selects_token_field() -> Result<()> {
        let naming = TokenNaming::new(
            "access_token",
            [("alice".to_string(), "alice_token".to_string())],
        )?;
        let fx = fixture(StrategyPolicy::AlwaysSingleFactor, naming).await?;
        let (status, body) = post_json(
            &fx.app,
            "/v1/auth/login",
            &serde_json::json!({"identity": "alice", "password": "s3cret"}),
        )
        .await?;

        assert_eq!(status, StatusCode::OK);
        assert!(body["alice_token"].is_string());
        assert!(body.get("access_token").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn otp_flow_over_http() -> Result<()> {
        let fx = fixture(StrategyPolicy::PreferOtpWithFallback, TokenNaming::default()).await?;
        let (status, body) = post_json(
            &fx.app,
            "/v1/auth/login",
            &serde_json::json!({"email": "alice@example.com", "password": "s3cret"}),
        )
        .await?;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["otp_required"], Value::Bool(true));
        assert_eq!(body["authenticated"], Value::Bool(false));

        let code = fx
            .inbox
            .0
            .lock()
            .ok()
            .and_then(|inbox| inbox.last().cloned())
            .context("code delivered")?;
        let (status, body) = post_json(
            &fx.app,
            "/v1/auth/otp/verify",
            &serde_json::json!({
                "session_id": body["session_id"],
                "user_id": body["user_id"],
                "code": code,
            }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn denials_share_one_body() -> Result<()> {
        let fx = fixture(StrategyPolicy::AlwaysSingleFactor, TokenNaming::default()).await?;
        let cases = [
            ("/v1/auth/login", serde_json::json!({"username": "alice", "password": "wrong"})),
            ("/v1/auth/login", serde_json::json!({"username": "nobody", "password": "s3cret"})),
            ("/v1/auth/login", serde_json::json!({"username": "root", "password": "s3cret"})),
            ("/v1/auth/admin/login", serde_json::json!({"username": "alice", "password": "s3cret"})),
        ];

        for (uri, payload) in cases {
            let (status, body) = post_json(&fx.app, uri, &payload).await?;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} {payload}");
            assert_eq!(body, serde_json::json!({"authenticated": false}));
        }
        Ok(())
    }

    #[tokio::test]
    async fn admin_entry_accepts_privileged_role() -> Result<()> {
        let fx = fixture(StrategyPolicy::AlwaysSingleFactor, TokenNaming::default()).await?;
        let (status, body) = post_json(
            &fx.app,
            "/v1/auth/admin/login",
            &serde_json::json!({"username": "root", "password": "s3cret"}),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let token = body["access_token"].as_str().context("access_token")?;
        assert_eq!(fx.issuer.verify(token)?.role, "admin");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() -> Result<()> {
        let fx = fixture(StrategyPolicy::AlwaysSingleFactor, TokenNaming::default()).await?;
        let (status, body) = post_json(
            &fx.app,
            "/v1/auth/otp/verify",
            &serde_json::json!({"session_id": "x", "user_id": "not-a-uuid", "code": "1"}),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({"authenticated": false}));

        let (status, _) = post_json(
            &fx.app,
            "/v1/auth/otp/resend",
            &serde_json::json!({"session_id": "short", "user_id": Uuid::new_v4()}),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        Ok(())
    }
}
