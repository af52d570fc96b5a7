// crates/core/src/events.rs
//! Typed progress events emitted while a job runs.

use serde::Serialize;

use crate::job::JobId;

/// Everything a subscriber can be told about a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum JobEvent {
    #[serde(rename = "jobStarted")]
    Started,
    #[serde(rename = "unitDelivered")]
    UnitDelivered { value: String },
    #[serde(rename = "progressUpdated")]
    ProgressUpdated { percentage: f64 },
    #[serde(rename = "jobCompleted")]
    Completed { result: String },
    #[serde(rename = "jobCancelled")]
    Cancelled,
    #[serde(rename = "jobFailed")]
    Failed { message: String },
}

impl JobEvent {
    /// Completed, cancelled and failed close the stream for a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled | Self::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => "jobStarted",
            Self::UnitDelivered { .. } => "unitDelivered",
            Self::ProgressUpdated { .. } => "progressUpdated",
            Self::Completed { .. } => "jobCompleted",
            Self::Cancelled => "jobCancelled",
            Self::Failed { .. } => "jobFailed",
        }
    }
}

/// An event addressed to a job's topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub job_id: JobId,
    #[serde(flatten)]
    pub event: JobEvent,
}
