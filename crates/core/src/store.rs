// crates/core/src/store.rs
//! Job store and the unbounded queue feeding the background worker.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cancellation::CancellationRegistry;
use crate::error::JobError;
use crate::job::{Job, JobHandle, JobId};

/// Single source of truth for job records.
///
/// Records are mutated only through [`JobStore::update`] and
/// [`JobStore::cancel_job`], both of which hold the record's map entry for the
/// whole check-and-transition, so a cancel request can never interleave with
/// the worker's own transition on the same job.
pub struct JobStore {
    jobs: DashMap<JobId, Job>,
    queue_tx: mpsc::UnboundedSender<JobId>,
    cancellations: CancellationRegistry,
}

/// Consumer side of the job queue. Owned by exactly one worker.
pub struct JobQueue {
    rx: mpsc::UnboundedReceiver<JobId>,
}

impl JobQueue {
    /// Wait for the next queued job.
    ///
    /// Returns `None` once `shutdown` fires or every producer has been dropped.
    pub async fn next(&mut self, shutdown: &CancellationToken) -> Option<JobId> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            id = self.rx.recv() => id,
        }
    }
}

impl JobStore {
    /// Create an empty store together with the consumer end of its queue.
    pub fn new() -> (Self, JobQueue) {
        let (queue_tx, rx) = mpsc::unbounded_channel();
        let store = Self {
            jobs: DashMap::new(),
            queue_tx,
            cancellations: CancellationRegistry::new(),
        };
        (store, JobQueue { rx })
    }

    /// Validate `input`, record a new `Queued` job and hand it to the worker.
    pub fn create_job(&self, input: &str) -> Result<JobHandle, JobError> {
        let job = Job::new(JobId::new(), input)?;
        let handle = self.insert_and_enqueue(job)?;
        counter!("jobs_created_total").increment(1);
        tracing::info!(job_id = %handle.id, input_len = input.len(), "job created and queued");
        Ok(handle)
    }

    pub(crate) fn insert_and_enqueue(&self, job: Job) -> Result<JobHandle, JobError> {
        let id = job.id();
        let handle = job.handle();
        match self.jobs.entry(id) {
            Entry::Occupied(_) => {
                tracing::error!(job_id = %id, "failed to add job to store: id already present");
                return Err(JobError::DuplicateId(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(job);
            }
        }

        if self.queue_tx.send(id).is_err() {
            self.jobs.remove(&id);
            tracing::error!(job_id = %id, "job queue closed, dropping job");
            return Err(JobError::QueueClosed);
        }
        Ok(handle)
    }

    /// Snapshot of the job, or `None` if the id is unknown.
    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    /// Apply `f` to the job while holding its entry.
    pub fn update<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        let mut job = self.jobs.get_mut(id).ok_or(JobError::NotFound(*id))?;
        f(&mut job)
    }

    /// Cancel a queued or running job.
    ///
    /// Returns `false` when the job is unknown or already finished. Signals the
    /// worker's token when the job has been claimed; the status flips to
    /// `Cancelled` either way.
    pub fn cancel_job(&self, id: &JobId) -> bool {
        let Some(mut job) = self.jobs.get_mut(id) else {
            tracing::warn!(job_id = %id, "attempted to cancel non-existent job");
            return false;
        };
        if !job.can_be_cancelled() {
            tracing::warn!(job_id = %id, status = %job.status(), "job cannot be cancelled");
            return false;
        }

        if self.cancellations.cancel(id) {
            tracing::info!(job_id = %id, "signalled in-flight job");
        }
        if let Err(e) = job.cancel() {
            tracing::error!(job_id = %id, error = %e, "cancel transition rejected");
            return false;
        }
        tracing::info!(job_id = %id, "job cancelled");
        true
    }

    pub fn register_cancellation(&self, id: JobId, token: CancellationToken) -> Result<(), JobError> {
        self.cancellations.register(id, token)
    }

    pub fn unregister_cancellation(&self, id: &JobId) -> bool {
        self.cancellations.unregister(id)
    }

    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
