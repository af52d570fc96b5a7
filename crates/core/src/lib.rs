// crates/core/src/lib.rs
//! Job lifecycle, queue, cancellation and notification delivery.
//!
//! Provides:
//! - `Job` / `JobStatus`: the job record and its state machine
//! - `JobStore` / `JobQueue`: concurrent store plus the queue feeding the worker
//! - `CancellationRegistry`: job id to in-flight cancellation token
//! - `JobWorker`: the single queue consumer, one supervised task per job
//! - `NotificationService`: live-or-buffered delivery of `JobEvent`s

pub mod cancellation;
pub mod config;
pub mod connections;
pub mod error;
pub mod events;
pub mod job;
pub mod notify;
pub mod store;
pub mod transform;
pub mod worker;

pub use cancellation::CancellationRegistry;
pub use config::{ConfigError, WorkerConfig};
pub use connections::ConnectionTracker;
pub use error::{DeliveryError, JobError, TransformError};
pub use events::{JobEvent, Notification};
pub use job::{Job, JobHandle, JobId, JobStatus};
pub use notify::{ChannelNotifier, JobNotifier, NotificationService};
pub use store::{JobQueue, JobStore};
pub use transform::{FrequencyEncoder, StringTransform};
pub use worker::JobWorker;

pub use tokio_util::sync::CancellationToken;
