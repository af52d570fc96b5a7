//! Prometheus scrape endpoint for the job counters and the in-flight gauge.

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::metrics::render_metrics;
use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics - job and hub metrics in Prometheus text format.
///
/// 503 until `init_metrics` has installed the recorder.
pub async fn metrics_handler() -> Response {
    let Some(output) = render_metrics() else {
        tracing::debug!("metrics scraped before recorder was installed");
        return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response();
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        output,
    )
        .into_response()
}

/// Mounted at the root, not under `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_handler))
}
