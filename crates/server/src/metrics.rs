//! Prometheus recorder for the job server.
//!
//! The core crate emits through the `metrics` facade; this module installs the
//! recorder those calls land in and renders it for `GET /metrics`.

use metrics::{counter, describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `true` if this call installed the recorder. Concurrent callers wait
/// for the first one to finish.
pub fn init_metrics() -> bool {
    let mut installed = false;
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Failed to set global metrics recorder (already set)");
        } else {
            describe_metrics();
            tracing::info!("Prometheus metrics initialized");
            installed = true;
        }
        handle
    });
    installed
}

fn describe_metrics() {
    describe_counter!("jobs_created_total", "Jobs accepted by the store");
    describe_counter!(
        "jobs_finished_total",
        "Jobs that reached a terminal state, by outcome"
    );
    describe_gauge!("jobs_in_flight", "Jobs currently owned by the worker");
    describe_counter!(
        "notifications_buffered_total",
        "Events queued because the job had no subscriber"
    );
    describe_counter!(
        "notification_delivery_failures_total",
        "Events the transport failed to deliver"
    );
    describe_counter!("hub_sessions_total", "WebSocket sessions opened on the hub");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record a newly opened hub session.
pub fn record_session_opened() {
    counter!("hub_sessions_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_after_init() {
        init_metrics();
        record_session_opened();
        let output = render_metrics().expect("recorder installed");
        assert!(output.contains("hub_sessions_total"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_metrics();
        assert!(!init_metrics());
    }
}
