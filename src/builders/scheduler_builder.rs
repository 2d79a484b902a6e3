//! Fluent construction of a `JobScheduler`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{SchedulerConfig, ShutdownPolicy, WorkerPriority};
use crate::core::{FailureSink, JobScheduler, SchedulerError, TracingFailureSink};
use crate::util::Priority;

/// Builder for [`JobScheduler`].
///
/// ```
/// use prometheus_job_scheduler::builders::SchedulerBuilder;
/// use prometheus_job_scheduler::config::ShutdownPolicy;
///
/// let scheduler = SchedulerBuilder::new()
///     .worker_count(2)
///     .thread_name_prefix("trace-flush")
///     .shutdown_policy(ShutdownPolicy::Abandon)
///     .build()
///     .unwrap();
/// assert_eq!(scheduler.worker_count(), 2);
/// ```
#[must_use]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    failure_sink: Option<Arc<dyn FailureSink>>,
}

impl SchedulerBuilder {
    /// Start from default configuration.
    pub fn new() -> Self {
        Self::from_config(SchedulerConfig::default())
    }

    /// Start from an existing configuration.
    pub fn from_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            failure_sink: None,
        }
    }

    /// Start from `JOB_SCHEDULER_*` environment variables.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, SchedulerError> {
        SchedulerConfig::from_env()
            .map(Self::from_config)
            .map_err(SchedulerError::InvalidConfig)
    }

    /// Requested worker count; zero or negative picks `max(1, logical_cpus - 2)`.
    pub const fn worker_count(mut self, worker_count: i64) -> Self {
        self.config.worker_count = worker_count;
        self
    }

    /// Worker thread name prefix.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Worker stack size in bytes.
    pub const fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.config.thread_stack_size = bytes;
        self
    }

    /// OS scheduling priority of workers.
    pub const fn worker_priority(mut self, priority: WorkerPriority) -> Self {
        self.config.worker_priority = priority;
        self
    }

    /// Handling of queued entries at shutdown.
    pub const fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = policy;
        self
    }

    /// How long shutdown waits for workers to exit.
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Priority used by `schedule_default`, `spawn`, `run_async` and `try_run_async`.
    pub const fn default_priority(mut self, priority: Priority) -> Self {
        self.config.default_priority = priority;
        self
    }

    /// Where failures of untracked jobs are reported. Defaults to
    /// [`TracingFailureSink`].
    pub fn failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    /// Validate the configuration and spawn the workers.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::Spawn` if a worker thread cannot be spawned
    pub fn build(self) -> Result<JobScheduler, SchedulerError> {
        let sink: Arc<dyn FailureSink> = match self.failure_sink {
            Some(sink) => sink,
            None => Arc::new(TracingFailureSink),
        };
        JobScheduler::start(self.config, sink)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_applies_settings() {
        let scheduler = SchedulerBuilder::new()
            .worker_count(3)
            .worker_priority(WorkerPriority::Normal)
            .default_priority(Priority::HIGH)
            .join_timeout(Duration::from_millis(500))
            .build()
            .unwrap();

        assert_eq!(scheduler.worker_count(), 3);
        assert_eq!(scheduler.config().default_priority, Priority::HIGH);
        assert_eq!(scheduler.config().join_timeout_ms, 500);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = SchedulerBuilder::new().thread_name_prefix("  ").build();
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }
}
