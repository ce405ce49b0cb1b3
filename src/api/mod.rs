use crate::{api::handlers::health, engine::AuthOrchestrator};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::options,
    Extension, Router,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

mod client_ip;
pub mod handlers;
// Route registration and document metadata.
mod openapi;

pub use client_ip::{ClientIp, TrustedProxies};
pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Where accounts and refresh tokens live; reported by `/health`.
#[derive(Clone, Debug)]
pub enum StorageBackend {
    Memory,
    Postgres(PgPool),
}

impl StorageBackend {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres(_) => "postgres",
        }
    }
}

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// The full application: documented routes, undocumented extras and layers.
#[must_use]
pub fn app(
    orchestrator: Arc<AuthOrchestrator>,
    backend: StorageBackend,
    trusted_proxies: TrustedProxies,
) -> Router {
    let (router, _openapi) = router().split_for_parts();
    router.route("/health", options(health::health)).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID_HEADER),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID_HEADER,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(orchestrator))
            .layer(Extension(backend))
            .layer(Extension(trusted_proxies)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    orchestrator: Arc<AuthOrchestrator>,
    backend: StorageBackend,
    trusted_proxies: TrustedProxies,
) -> Result<()> {
    info!(storage = backend.as_str(), "storage backend selected");
    if trusted_proxies.is_empty() {
        info!("No trusted proxies, rate limiting keys on the TCP peer address");
    }

    let app = app(orchestrator, backend, trusted_proxies);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
