//! Error types for scheduler operations.

use std::any::Any;

use thiserror::Error;

/// Errors produced while constructing a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Outcome of a failed job, delivered through a `JobHandle` or a failure sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job body panicked. Carries the panic message.
    #[error("job panicked: {0}")]
    Panicked(String),
    /// The job body returned an error. Carries the rendered error chain.
    #[error("job failed: {0}")]
    Failed(String),
    /// The job was dropped by the scheduler without running.
    #[error("job was abandoned before it ran")]
    Abandoned,
}

impl JobError {
    /// Build a `Panicked` error from a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panicked(message)
    }

    /// Build a `Failed` error from an `anyhow::Error`, keeping its context chain.
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

/// Application-facing result using anyhow for job bodies and higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
