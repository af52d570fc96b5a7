// crates/server/src/lib.rs
//! Longrun server library.
//!
//! Axum HTTP API for submitting and cancelling jobs, plus the WebSocket hub
//! that streams each job's progress to its subscriber.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use longrun_core::{
    CancellationToken, ChannelNotifier, ConnectionTracker, FrequencyEncoder, JobStore, JobWorker,
    NotificationService, WorkerConfig,
};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Background tasks behind the HTTP surface: the job worker and the
/// notification dispatcher.
pub struct Services {
    pub state: Arc<AppState>,
    worker: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    dispatch_stop: CancellationToken,
}

impl Services {
    /// Wire the store, notifier and worker together and start them on the
    /// current runtime. The worker stops when `shutdown` fires.
    pub fn start(worker_config: WorkerConfig, shutdown: CancellationToken) -> Self {
        let (store, queue) = JobStore::new();
        let store = Arc::new(store);
        let (notifier, outbox) = ChannelNotifier::new();
        let notifications = Arc::new(NotificationService::new(
            Arc::new(notifier),
            Arc::new(ConnectionTracker::new()),
        ));
        let state = AppState::new(store.clone(), notifications.clone());

        let worker = JobWorker::new(
            store,
            notifications,
            Arc::new(FrequencyEncoder),
            worker_config,
        )
        .spawn(queue, shutdown);

        let dispatch_stop = CancellationToken::new();
        let dispatcher = tokio::spawn(dispatch::run(outbox, state.clone(), dispatch_stop.clone()));

        Self {
            state,
            worker,
            dispatcher,
            dispatch_stop,
        }
    }

    /// Wait for the worker to finish its in-flight jobs, then route whatever
    /// they emitted on the way out and stop the dispatcher.
    pub async fn join(self) {
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "job worker task failed");
        }
        self.dispatch_stop.cancel();
        if let Err(e) = self.dispatcher.await {
            tracing::error!(error = %e, "dispatcher task failed");
        }
    }
}

/// CORS for the configured origin, or any origin when unset.
pub fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let allow_origin = match origin {
        Some(origin) => AllowOrigin::exact(
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin: {origin}"))?,
        ),
        None => AllowOrigin::from(Any),
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, jobs) and the progress hub
/// - CORS (any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    create_app_with_cors(state, cors)
}

pub fn create_app_with_cors(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    /// Helper to make a GET request to the app.
    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();

        (status, body_str)
    }

    fn app() -> (Router, Services, CancellationToken) {
        let shutdown = CancellationToken::new();
        let services = Services::start(WorkerConfig::default(), shutdown.clone());
        (create_app(services.state.clone()), services, shutdown)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _services, _shutdown) = app();
        let (status, body) = get(app, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
        assert!(body.contains("\"version\""));
        assert!(body.contains("\"uptime_secs\""));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (app, _services, _shutdown) = app();
        let (status, _) = get(app, "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_services_join_after_shutdown() {
        let (_app, services, shutdown) = app();
        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), services.join())
            .await
            .expect("services stop after shutdown");
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(Some("http://localhost:3000")).is_ok());
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
    }
}
