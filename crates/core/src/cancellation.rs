// crates/core/src/cancellation.rs
//! Registry correlating job ids with the token of their in-flight task.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::job::JobId;

/// Concurrent map from job id to the cancellation token of its processing task.
///
/// A token lives here from the moment the worker claims the job until its
/// processing ends. Re-registering while a token is active is rejected.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: DashMap<JobId, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: JobId, token: CancellationToken) -> Result<(), JobError> {
        match self.tokens.entry(id) {
            Entry::Occupied(_) => {
                tracing::error!(job_id = %id, "cancellation handle already registered");
                Err(JobError::AlreadyRegistered(id))
            }
            Entry::Vacant(slot) => {
                slot.insert(token);
                Ok(())
            }
        }
    }

    /// Remove and drop the handle. Returns whether one was registered.
    pub fn unregister(&self, id: &JobId) -> bool {
        self.tokens.remove(id).is_some()
    }

    /// Signal the handle for `id`, if the worker has claimed the job.
    pub fn cancel(&self, id: &JobId) -> bool {
        match self.tokens.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: &JobId) -> bool {
        self.tokens.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
