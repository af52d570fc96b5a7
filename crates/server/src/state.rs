// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use longrun_core::{ConnectionTracker, JobStore, NotificationService};
use tokio::sync::mpsc;

/// Outbound half of a hub session. Frames are pre-serialized JSON text.
pub type SessionSender = mpsc::UnboundedSender<String>;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Job records plus the producer side of the work queue.
    pub store: Arc<JobStore>,
    /// Live-or-buffered delivery of job events.
    pub notifications: Arc<NotificationService>,
    /// Open hub sessions, keyed by session id.
    pub sessions: DashMap<String, SessionSender>,
    /// Path the hub is mounted at, echoed back in `hubUrl`.
    pub hub_path: &'static str,
}

impl AppState {
    pub fn new(store: Arc<JobStore>, notifications: Arc<NotificationService>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            store,
            notifications,
            sessions: DashMap::new(),
            hub_path: crate::hub::HUB_PATH,
        })
    }

    /// Job id to subscribing session.
    pub fn connections(&self) -> &ConnectionTracker {
        self.notifications.connections()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
