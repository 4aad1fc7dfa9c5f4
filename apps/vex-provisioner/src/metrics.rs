//! Prometheus exposition and health endpoints.
//!
//! The listener starts only after the consumer group has joined, so a scrape
//! target that answers is already consuming. `/readyz` tracks the session
//! afterwards and flips to 503 during shutdown.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use vex_events::{DispatchMetrics, Readiness};
use vex_provisioning::ProvisionMetrics;

/// Owns the registry and every metric family the daemon exports.
pub struct MetricsRegistry {
    pub registry: Registry,
    pub provision: ProvisionMetrics,
    pub dispatch: DispatchMetrics,
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let provision = ProvisionMetrics::register(&mut registry);
        let dispatch = DispatchMetrics::register(&mut registry);
        Self {
            registry,
            provision,
            dispatch,
        }
    }

    /// Encode all families in the text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    pub readiness: Readiness,
}

/// Build the router: metrics at `metrics_path`, plus liveness and readiness.
pub fn router(state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_handler))
        .with_state(state)
}

/// Handler for the metrics route.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn readiness_handler(State(state): State<AppState>) -> Response {
    let status = state.readiness.status();
    if status.is_ready() {
        (StatusCode::OK, status.state.as_str()).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, status.state.as_str()).into_response()
    }
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
