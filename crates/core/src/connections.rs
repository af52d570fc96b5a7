// crates/core/src/connections.rs
//! Which transport session is currently subscribed to which job.

use dashmap::DashMap;

use crate::job::JobId;

/// Job id → session id. At most one session per job; the last join wins.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    sessions: DashMap<JobId, String>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `session_id` to `job_id`, evicting any previous subscriber.
    pub fn add(&self, job_id: JobId, session_id: impl Into<String>) {
        let session_id = session_id.into();
        if let Some(old) = self.sessions.insert(job_id, session_id.clone()) {
            if old != session_id {
                tracing::warn!(
                    job_id = %job_id,
                    old_session = %old,
                    new_session = %session_id,
                    "replacing subscriber for job"
                );
            }
        }
    }

    /// Remove the mapping only if `session_id` still owns it.
    pub fn remove_if_owned(&self, job_id: &JobId, session_id: &str) -> bool {
        self.sessions
            .remove_if(job_id, |_, owner| owner == session_id)
            .is_some()
    }

    pub fn is_connected(&self, job_id: &JobId) -> bool {
        self.sessions.contains_key(job_id)
    }

    pub fn session_for(&self, job_id: &JobId) -> Option<String> {
        self.sessions.get(job_id).map(|s| s.value().clone())
    }

    /// Every job currently routed to `session_id`.
    pub fn jobs_for_session(&self, session_id: &str) -> Vec<JobId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value() == session_id)
            .map(|entry| *entry.key())
            .collect()
    }
}
