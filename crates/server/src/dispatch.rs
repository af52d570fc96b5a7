// crates/server/src/dispatch.rs
//! Routes job notifications to the hub session subscribed to each job.
//!
//! `NotificationService` decides live-vs-buffered and pushes live events into a
//! single channel; this task is the only reader of that channel, so per-job
//! order on the wire matches the order events were accepted.

use std::sync::Arc;

use longrun_core::{CancellationToken, DeliveryError, Notification};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::AppState;

/// Drain `outbox` until it closes or `stop` fires. On stop, whatever is already
/// queued is still routed.
pub async fn run(
    mut outbox: mpsc::UnboundedReceiver<Notification>,
    state: Arc<AppState>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            next = outbox.recv() => match next {
                Some(notification) => report(route(&state, &notification), &notification),
                None => break,
            },
            _ = stop.cancelled() => {
                while let Ok(notification) = outbox.try_recv() {
                    report(route(&state, &notification), &notification);
                }
                break;
            }
        }
    }
    debug!("notification dispatcher stopped");
}

/// Send one notification to the session currently subscribed to its job.
pub fn route(state: &AppState, notification: &Notification) -> Result<(), DeliveryError> {
    let job_id = notification.job_id;
    let session_id = state
        .connections()
        .session_for(&job_id)
        .ok_or(DeliveryError::NoSubscriber(job_id))?;

    let frame = match serde_json::to_string(notification) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%job_id, error = %e, "failed to serialize notification");
            return Err(DeliveryError::ChannelClosed);
        }
    };

    let sender = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| DeliveryError::SessionGone(session_id.clone()))?;
    sender
        .send(frame)
        .map_err(|_| DeliveryError::SessionGone(session_id))
}

fn report(result: Result<(), DeliveryError>, notification: &Notification) {
    if let Err(e) = result {
        counter!("notification_delivery_failures_total").increment(1);
        warn!(
            job_id = %notification.job_id,
            event = notification.event.name(),
            error = %e,
            "dropped notification"
        );
    }
}
