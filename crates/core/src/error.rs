// crates/core/src/error.rs
use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Errors raised by the job record, store and cancellation registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Input cannot be null or empty")]
    EmptyInput,

    #[error("Invalid job state transition: {action} is not allowed from {from}")]
    InvalidTransition { from: JobStatus, action: &'static str },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {0} already exists in the store")]
    DuplicateId(JobId),

    #[error("A cancellation handle is already registered for job {0}")]
    AlreadyRegistered(JobId),

    #[error("Job queue is closed; no worker is consuming it")]
    QueueClosed,
}

impl JobError {
    pub(crate) fn transition(from: JobStatus, action: &'static str) -> Self {
        Self::InvalidTransition { from, action }
    }

    /// True when the job was in the wrong state for the requested transition.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// Errors from the string transform collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Input cannot be null or empty")]
    EmptyInput,
}

/// A notification could not be handed to the transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("No session subscribed to job {0}")]
    NoSubscriber(JobId),

    #[error("Session {0} is no longer connected")]
    SessionGone(String),
}
