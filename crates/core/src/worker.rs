// crates/core/src/worker.rs
//! Background worker: drains the job queue and streams each job's result.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::{JobError, TransformError};
use crate::job::{JobId, JobStatus};
use crate::notify::NotificationService;
use crate::store::{JobQueue, JobStore};
use crate::transform::StringTransform;

/// Why a job's processing loop stopped early.
#[derive(Debug, Error)]
enum ProcessError {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// How a job's processing loop ended normally.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Completed,
    /// The job was no longer queued when the worker claimed it.
    Skipped(JobStatus),
}

/// The single consumer of the job queue.
///
/// Only the dequeue is serialized: every claimed job runs in its own task,
/// tracked in a `JoinSet`, under a child of the process-wide shutdown token.
pub struct JobWorker {
    store: Arc<JobStore>,
    notifications: Arc<NotificationService>,
    transform: Arc<dyn StringTransform>,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(
        store: Arc<JobStore>,
        notifications: Arc<NotificationService>,
        transform: Arc<dyn StringTransform>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            notifications,
            transform,
            config,
        }
    }

    /// Run the worker on the current runtime until `shutdown` fires.
    pub fn spawn(self, queue: JobQueue, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(queue, shutdown))
    }

    /// Consume the queue until shutdown (or until every producer is gone), then
    /// wait for all in-flight jobs to finish.
    pub async fn run(self, mut queue: JobQueue, shutdown: CancellationToken) {
        let worker = Arc::new(self);
        let mut in_flight: JoinSet<()> = JoinSet::new();
        tracing::info!("job worker started");

        loop {
            tokio::select! {
                next = queue.next(&shutdown) => {
                    let Some(id) = next else { break };
                    let task_worker = Arc::clone(&worker);
                    let token = shutdown.child_token();
                    in_flight.spawn(async move { task_worker.process_job(id, token).await });
                    gauge!("jobs_in_flight").set(in_flight.len() as f64);
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                    gauge!("jobs_in_flight").set(in_flight.len() as f64);
                }
            }
        }

        tracing::info!(in_flight = in_flight.len(), "job worker stopping");
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        gauge!("jobs_in_flight").set(0.0);
        tracing::info!("job worker stopped");
    }

    async fn process_job(&self, id: JobId, token: CancellationToken) {
        if let Err(e) = self.store.register_cancellation(id, token.clone()) {
            tracing::error!(job_id = %id, error = %e, "job claimed twice, skipping");
            return;
        }

        match self.run_job(id, &token).await {
            Ok(Outcome::Completed) => {
                counter!("jobs_finished_total", "outcome" => "completed").increment(1);
                tracing::info!(job_id = %id, "job completed successfully");
            }
            Ok(Outcome::Skipped(JobStatus::Cancelled)) => self.finish_cancelled(id).await,
            Ok(Outcome::Skipped(status)) => {
                tracing::warn!(job_id = %id, status = %status, "job was not queued when claimed");
            }
            Err(e) if self.was_cancelled(&id, &token, &e) => self.finish_cancelled(id).await,
            Err(e) => self.finish_failed(id, &e),
        }

        self.store.unregister_cancellation(&id);
    }

    async fn run_job(&self, id: JobId, token: &CancellationToken) -> Result<Outcome, ProcessError> {
        let job = self.store.get_job(&id).ok_or(JobError::NotFound(id))?;
        if job.status() != JobStatus::Queued {
            return Ok(Outcome::Skipped(job.status()));
        }

        tracing::info!(job_id = %id, "starting to process job");
        let result = self.transform.transform(job.input())?;
        let units: Vec<char> = result.chars().collect();
        let total = units.len();

        self.store.update(&id, |job| job.start(total))?;
        pause(self.config.start_delay, token).await?;
        self.notifications.started(id);

        for (index, unit) in units.into_iter().enumerate() {
            if token.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }
            pause(self.config.unit_delay(), token).await?;

            self.notifications.unit_delivered(id, unit.to_string());
            let processed = index as i64 + 1;
            let percentage = self.store.update(&id, |job| {
                job.update_progress(processed)?;
                Ok(job.progress_percentage())
            })?;
            self.notifications.progress_updated(id, percentage);

            tracing::debug!(job_id = %id, processed, total, percentage, "sent unit");
        }

        self.store.update(&id, |job| job.complete(result.as_str()))?;
        self.notifications.completed(id, result);
        Ok(Outcome::Completed)
    }

    /// A state error right after a cancel request is the cancel winning the race.
    fn was_cancelled(&self, id: &JobId, token: &CancellationToken, error: &ProcessError) -> bool {
        match error {
            ProcessError::Cancelled => true,
            _ if token.is_cancelled() => true,
            ProcessError::Job(e) if e.is_state_error() => self
                .store
                .get_job(id)
                .is_some_and(|job| job.status() == JobStatus::Cancelled),
            _ => false,
        }
    }

    async fn finish_cancelled(&self, id: JobId) {
        tracing::info!(job_id = %id, "job was cancelled");
        let status = self.store.update(&id, |job| {
            if !job.is_terminal() {
                job.cancel()?;
            }
            Ok(job.status())
        });

        match status {
            Ok(JobStatus::Cancelled) => {
                if !self.config.cancel_grace.is_zero() {
                    tokio::time::sleep(self.config.cancel_grace).await;
                }
                self.notifications.cancelled(id);
                counter!("jobs_finished_total", "outcome" => "cancelled").increment(1);
            }
            Ok(other) => {
                tracing::warn!(job_id = %id, status = %other, "cancellation arrived after job finished");
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "failed to record cancellation");
            }
        }
    }

    fn finish_failed(&self, id: JobId, error: &ProcessError) {
        let message = format!("Job processing failed: {error}");
        tracing::error!(job_id = %id, error = %error, "job failed");

        match self.store.update(&id, |job| job.fail(message.as_str())) {
            Ok(()) => {
                self.notifications.failed(id, message);
                counter!("jobs_finished_total", "outcome" => "failed").increment(1);
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "failed to record job failure");
            }
        }
    }
}

/// Sleep for `duration` unless `token` fires first.
async fn pause(duration: Duration, token: &CancellationToken) -> Result<(), ProcessError> {
    if token.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProcessError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "job task panicked");
        } else {
            tracing::warn!(error = %e, "job task aborted");
        }
    }
}
