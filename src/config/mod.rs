//! Configuration models for the scheduler and its workers.

pub mod scheduler;

pub use scheduler::{
    SchedulerConfig, ShutdownPolicy, WorkerPriority, ENV_PREFIX, MAX_WORKER_COUNT,
    MIN_STACK_SIZE,
};
