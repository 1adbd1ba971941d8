use crate::api::handlers::health;
use crate::auth::{Authenticator, TokenIssuer};
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    response::Json,
    routing::{get, options},
    Extension, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

/// Documented routes, unlayered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Full application: documented routes, `/openapi.json` and the request layers.
#[must_use]
pub fn app(pool: PgPool, authenticator: Arc<Authenticator>, issuer: Arc<TokenIssuer>) -> Router {
    let (router, doc) = router().split_for_parts();

    router
        .route("/openapi.json", get(move || async move { Json(doc) }))
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(authenticator))
                .layer(Extension(issuer))
                .layer(Extension(pool)),
        )
}

/// Serve the API until ctrl-c, then stop the background tasks.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn new(
    port: u16,
    pool: PgPool,
    authenticator: Arc<Authenticator>,
    issuer: Arc<TokenIssuer>,
    background: Vec<JoinHandle<()>>,
) -> Result<()> {
    let app = app(pool, authenticator, issuer);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", err);
            }
            info!("Gracefully shutdown");
        })
        .await?;

    for task in background {
        task.abort();
    }

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http-request",
        http.method = %request.method(),
        http.route = request.uri().path(),
        request_id
    )
}
