//! Core scheduling abstractions: jobs, completion handles and the scheduler.

pub mod completion;
pub mod error;
pub mod failure;
pub mod job;
pub mod scheduler;

pub use completion::JobHandle;
pub use error::{AppResult, JobError, SchedulerError};
pub use failure::{FailureEvent, FailureSink, InMemoryFailureSink, TracingFailureSink};
pub use job::{batch_ranges, FnJob, Job, JobKind, ParallelJob};
pub use scheduler::{JobScheduler, SchedulerStats};
