// crates/core/src/notify.rs
//! Live-or-buffered delivery of job events.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::mpsc;

use crate::connections::ConnectionTracker;
use crate::error::DeliveryError;
use crate::events::{JobEvent, Notification};
use crate::job::JobId;

/// Hands an event to the real-time transport.
///
/// Called while the job's backlog slot is locked, so implementations must not
/// block and must not call back into [`NotificationService`].
pub trait JobNotifier: Send + Sync {
    fn deliver(&self, job_id: JobId, event: &JobEvent) -> Result<(), DeliveryError>;
}

/// Pushes every event onto an unbounded channel for a transport adapter to drain.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl JobNotifier for ChannelNotifier {
    fn deliver(&self, job_id: JobId, event: &JobEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(Notification {
                job_id,
                event: event.clone(),
            })
            .map_err(|_| DeliveryError::ChannelClosed)
    }
}

/// Decides whether an event goes out now or waits for a subscriber.
///
/// An event is delivered live only when a session is subscribed to the job and
/// nothing is buffered for it; otherwise it joins the job's backlog. Both the
/// decision and [`flush`](Self::flush) run under the backlog's map entry, so an
/// event raised mid-flush lands behind the buffered ones.
pub struct NotificationService {
    notifier: Arc<dyn JobNotifier>,
    connections: Arc<ConnectionTracker>,
    backlogs: DashMap<JobId, VecDeque<JobEvent>>,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn JobNotifier>, connections: Arc<ConnectionTracker>) -> Self {
        Self {
            notifier,
            connections,
            backlogs: DashMap::new(),
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionTracker> {
        &self.connections
    }

    pub fn notify(&self, job_id: JobId, event: JobEvent) {
        match self.backlogs.entry(job_id) {
            Entry::Occupied(mut backlog) => {
                backlog.get_mut().push_back(event);
                counter!("notifications_buffered_total").increment(1);
            }
            Entry::Vacant(slot) => {
                if self.connections.is_connected(&job_id) {
                    self.deliver(job_id, &event);
                } else {
                    tracing::debug!(job_id = %job_id, event = event.name(), "no subscriber, notification queued");
                    slot.insert(VecDeque::from([event]));
                    counter!("notifications_buffered_total").increment(1);
                }
            }
        }
    }

    /// Deliver everything buffered for `job_id`, in order, then drop the backlog.
    ///
    /// Returns how many events were handed to the transport successfully.
    pub fn flush(&self, job_id: &JobId) -> usize {
        let Entry::Occupied(mut backlog) = self.backlogs.entry(*job_id) else {
            tracing::debug!(job_id = %job_id, "no queued notifications");
            return 0;
        };

        let mut delivered = 0;
        for event in backlog.get_mut().drain(..) {
            if self.deliver(*job_id, &event) {
                delivered += 1;
            }
        }
        backlog.remove();
        tracing::info!(job_id = %job_id, count = delivered, "flushed queued notifications");
        delivered
    }

    /// Discard the backlog for a subscriber that went away.
    pub fn clear(&self, job_id: &JobId) {
        if let Some((_, dropped)) = self.backlogs.remove(job_id) {
            tracing::info!(job_id = %job_id, dropped = dropped.len(), "cleared notification queue");
        }
    }

    pub fn pending(&self, job_id: &JobId) -> usize {
        self.backlogs.get(job_id).map(|b| b.len()).unwrap_or(0)
    }

    pub fn started(&self, job_id: JobId) {
        self.notify(job_id, JobEvent::Started);
    }

    pub fn unit_delivered(&self, job_id: JobId, value: impl Into<String>) {
        self.notify(job_id, JobEvent::UnitDelivered { value: value.into() });
    }

    pub fn progress_updated(&self, job_id: JobId, percentage: f64) {
        self.notify(job_id, JobEvent::ProgressUpdated { percentage });
    }

    pub fn completed(&self, job_id: JobId, result: impl Into<String>) {
        self.notify(job_id, JobEvent::Completed { result: result.into() });
    }

    pub fn cancelled(&self, job_id: JobId) {
        self.notify(job_id, JobEvent::Cancelled);
    }

    pub fn failed(&self, job_id: JobId, message: impl Into<String>) {
        self.notify(job_id, JobEvent::Failed { message: message.into() });
    }

    fn deliver(&self, job_id: JobId, event: &JobEvent) -> bool {
        match self.notifier.deliver(job_id, event) {
            Ok(()) => true,
            Err(e) => {
                counter!("notification_delivery_failures_total").increment(1);
                tracing::error!(job_id = %job_id, event = event.name(), error = %e, "error sending notification");
                false
            }
        }
    }
}
