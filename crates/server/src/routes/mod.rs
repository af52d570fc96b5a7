//! API route handlers for the job server.

pub mod health;
pub mod jobs;
pub mod metrics;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::hub;
use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET /api/health - Health check
/// - POST /api/jobs - Queue a job
/// - GET /api/jobs/{id} - Job status
/// - POST /api/jobs/{id}/cancel - Cancel a job
/// - GET /hub/job-progress - WebSocket progress hub
/// - GET /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .merge(metrics::router())
        .route(hub::HUB_PATH, get(hub::ws_handler))
        .with_state(state)
}
