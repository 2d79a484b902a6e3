//! Scheduler configuration structures.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::{resolve_worker_count, Priority};

/// Environment variable prefix used by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "JOB_SCHEDULER_";

/// Largest accepted worker count.
pub const MAX_WORKER_COUNT: i64 = 4096;

/// Minimum accepted worker stack size in bytes.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// What happens to entries still queued when the scheduler shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Workers run every entry already queued, then exit.
    #[default]
    Drain,
    /// Queued entries are dropped; their handles reject with `JobError::Abandoned`.
    Abandon,
}

impl FromStr for ShutdownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "abandon" => Ok(Self::Abandon),
            other => Err(format!("unknown shutdown policy `{other}`")),
        }
    }
}

/// OS scheduling priority for worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPriority {
    /// Leave the OS default untouched.
    Normal,
    /// Lower the priority so workers yield to foreground threads.
    #[default]
    BelowNormal,
}

impl FromStr for WorkerPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "below_normal" | "below-normal" => Ok(Self::BelowNormal),
            other => Err(format!("unknown worker priority `{other}`")),
        }
    }
}

/// Root scheduler configuration.
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Requested worker threads. Zero or negative means
    /// `max(1, logical_cpus - 2)`.
    pub worker_count: i64,
    /// Worker thread name prefix; threads are named `{prefix}-{id}`.
    pub thread_name_prefix: String,
    /// Worker thread stack size in bytes.
    pub thread_stack_size: usize,
    /// OS scheduling priority for workers.
    pub worker_priority: WorkerPriority,
    /// Handling of queued entries at shutdown.
    pub shutdown_policy: ShutdownPolicy,
    /// How long shutdown waits for all workers to exit, in milliseconds.
    pub join_timeout_ms: u64,
    /// Priority used when the caller does not pick one.
    pub default_priority: Priority,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            thread_name_prefix: "job-worker".into(),
            thread_stack_size: 2 * 1024 * 1024,
            worker_priority: WorkerPriority::default(),
            shutdown_policy: ShutdownPolicy::default(),
            join_timeout_ms: 2_000,
            default_priority: Priority::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: i64) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the worker OS priority.
    #[must_use]
    pub const fn with_worker_priority(mut self, priority: WorkerPriority) -> Self {
        self.worker_priority = priority;
        self
    }

    /// Set the shutdown policy.
    #[must_use]
    pub const fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Set the shutdown join timeout in milliseconds.
    #[must_use]
    pub const fn with_join_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.join_timeout_ms = timeout_ms;
        self
    }

    /// Set the default job priority.
    #[must_use]
    pub const fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Number of workers this configuration spawns. Never zero.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        resolve_worker_count(self.worker_count)
    }

    /// Validate configuration values. Non-positive worker counts are clamped
    /// rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count > MAX_WORKER_COUNT {
            return Err(format!(
                "worker_count must be at most {MAX_WORKER_COUNT}, got {}",
                self.worker_count
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!(
                "thread_stack_size must be at least {MIN_STACK_SIZE} bytes"
            ));
        }
        if self.join_timeout_ms == 0 {
            return Err("join_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `JOB_SCHEDULER_*` environment variables,
    /// reading a `.env` file first if one exists. Unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup using the
    /// `JOB_SCHEDULER_*` variable names.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();

        if let Some(v) = get("WORKERS") {
            cfg.worker_count = parse_field("WORKERS", &v)?;
        }
        if let Some(v) = get("THREAD_PREFIX") {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = get("STACK_SIZE") {
            cfg.thread_stack_size = parse_field("STACK_SIZE", &v)?;
        }
        if let Some(v) = get("WORKER_PRIORITY") {
            cfg.worker_priority = v.parse()?;
        }
        if let Some(v) = get("SHUTDOWN_POLICY") {
            cfg.shutdown_policy = v.parse()?;
        }
        if let Some(v) = get("JOIN_TIMEOUT_MS") {
            cfg.join_timeout_ms = parse_field("JOIN_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("DEFAULT_PRIORITY") {
            cfg.default_priority = Priority::new(parse_field("DEFAULT_PRIORITY", &v)?);
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_field<T>(name: &str, value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))
}
