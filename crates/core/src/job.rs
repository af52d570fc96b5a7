// crates/core/src/job.rs
//! The job record and its lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// Opaque unique identifier for a job. Doubles as the notification topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle states of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary returned to the caller that created a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// One unit-of-work request with its own lifecycle and result.
///
/// All mutation goes through the transition methods below; each one checks the
/// current status first and leaves the record untouched when it fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    id: JobId,
    input: String,
    result: Option<String>,
    status: JobStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    total_units: usize,
    processed_units: usize,
}

impl Job {
    /// Create a job in `Queued`. Rejects blank input.
    pub fn new(id: JobId, input: impl Into<String>) -> Result<Self, JobError> {
        let input = input.into();
        if input.trim().is_empty() {
            return Err(JobError::EmptyInput);
        }
        Ok(Self {
            id,
            input,
            result: None,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            total_units: 0,
            processed_units: 0,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn total_units(&self) -> usize {
        self.total_units
    }

    pub fn processed_units(&self) -> usize {
        self.processed_units
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            status: self.status,
            created_at: self.created_at,
        }
    }

    /// `Queued -> Processing`.
    pub fn start(&mut self, total_units: usize) -> Result<(), JobError> {
        if self.status != JobStatus::Queued {
            return Err(JobError::transition(self.status, "start"));
        }
        if total_units == 0 {
            return Err(JobError::OutOfRange {
                field: "totalUnits",
                value: 0,
                min: 1,
                max: i64::MAX,
            });
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.total_units = total_units;
        self.processed_units = 0;
        Ok(())
    }

    /// Record how many units have been delivered so far.
    pub fn update_progress(&mut self, processed: i64) -> Result<(), JobError> {
        if self.status != JobStatus::Processing {
            return Err(JobError::transition(self.status, "updateProgress"));
        }
        let max = self.total_units as i64;
        if !(0..=max).contains(&processed) {
            return Err(JobError::OutOfRange {
                field: "processedUnits",
                value: processed,
                min: 0,
                max,
            });
        }
        self.processed_units = processed as usize;
        Ok(())
    }

    /// `Processing -> Completed`.
    pub fn complete(&mut self, result: impl Into<String>) -> Result<(), JobError> {
        if self.status != JobStatus::Processing {
            return Err(JobError::transition(self.status, "complete"));
        }
        let result = result.into();
        if result.is_empty() {
            return Err(JobError::EmptyValue("Result"));
        }
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        self.processed_units = self.total_units;
        Ok(())
    }

    /// `Queued | Processing -> Cancelled`. Cancelling twice is a no-op.
    pub fn cancel(&mut self) -> Result<(), JobError> {
        match self.status {
            JobStatus::Cancelled => Ok(()),
            JobStatus::Completed | JobStatus::Failed => {
                Err(JobError::transition(self.status, "cancel"))
            }
            JobStatus::Queued | JobStatus::Processing => {
                self.status = JobStatus::Cancelled;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
        }
    }

    /// `Queued | Processing -> Failed`. Rejected from every terminal state,
    /// `Cancelled` and `Failed` included.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::transition(self.status, "fail"));
        }
        let message = message.into();
        if message.trim().is_empty() {
            return Err(JobError::EmptyValue("Error message"));
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Processing)
    }

    /// Percentage of units delivered, 0 when nothing has been sized yet.
    pub fn progress_percentage(&self) -> f64 {
        if self.total_units == 0 {
            return 0.0;
        }
        self.processed_units as f64 / self.total_units as f64 * 100.0
    }
}
