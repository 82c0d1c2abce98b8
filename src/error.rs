//! Error types for the generation queue.

use std::time::Duration;

use uuid::Uuid;

use crate::queue::Lane;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors surfaced by the lane queues and the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The lane is at its bound. Nothing was mutated.
    #[error("The {lane} queue is full ({capacity} jobs), try again later")]
    CapacityExceeded { lane: Lane, capacity: usize },

    /// The caller or job failed admission. Nothing was mutated.
    #[error("Not eligible: {reason}")]
    Ineligible { reason: String },

    /// Reported asynchronously to the caller, never returned from enqueue.
    #[error("Job {job_id} timed out after {timeout:?}")]
    Timeout { job_id: Uuid, timeout: Duration },
}

impl QueueError {
    pub(crate) fn ineligible(reason: impl Into<String>) -> Self {
        Self::Ineligible {
            reason: reason.into(),
        }
    }
}

/// Admission policy and hardware status errors.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Status probe for {backend} failed: {reason}")]
    ProbeFailed { backend: String, reason: String },

    #[error("Status probe timed out after {timeout:?}")]
    ProbeTimeout { timeout: Duration },

    #[error("Workflow registry error: {0}")]
    Registry(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} is closed")]
    Closed { name: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
