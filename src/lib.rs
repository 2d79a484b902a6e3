//! # Prometheus Job Scheduler
//!
//! A priority job scheduler: a fixed pool of OS worker threads consuming from
//! one shared priority queue.
//!
//! ## Key Features
//!
//! - **Strict priority**: lower [`Priority`](util::Priority) values run first,
//!   `0` is the most urgent; equal priorities run in arrival order
//! - **Fire-and-forget jobs**: failures are never silent, they reach a
//!   [`FailureSink`](core::FailureSink) (logged through `tracing` by default)
//! - **Awaitable jobs**: `run_async` returns a [`JobHandle`](core::JobHandle)
//!   usable as a `Future` from any async runtime, or waited on synchronously
//! - **Parallel-for**: one call becomes `ceil(count / batch_size)` batches
//!   queued at the highest priority
//! - **No polling**: idle workers park on a condition variable
//! - **Background-friendly**: workers run below normal OS priority by default
//!
//! ## Example
//!
//! ```rust
//! use prometheus_job_scheduler::core::{AppResult, JobError, JobScheduler};
//! use prometheus_job_scheduler::util::Priority;
//!
//! let scheduler = JobScheduler::with_workers(0)?; // max(1, cpus - 2) workers
//!
//! // Fire-and-forget
//! scheduler.schedule(|| -> AppResult<()> { Ok(()) }, Priority::LOW);
//!
//! // Awaitable
//! assert_eq!(scheduler.run_async(|| 27 + 19).wait(), Ok(46));
//!
//! // Errors travel through the handle
//! let failed = scheduler.try_run_async(|| -> AppResult<u32> { anyhow::bail!("no input") });
//! assert_eq!(failed.wait(), Err(JobError::Failed("no input".into())));
//!
//! scheduler.shutdown();
//! # Ok::<(), prometheus_job_scheduler::core::SchedulerError>(())
//! ```
//!
//! For complete examples, see `tests/scheduler_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: jobs, handles, failure sinks and the scheduler.
pub mod core;
/// Configuration models for the scheduler and its workers.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Shared job queue.
pub(crate) mod infra;
/// Shared utilities.
pub mod util;

pub use crate::core::{JobHandle, JobScheduler};
pub use crate::util::Priority;
