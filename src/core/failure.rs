//! Failure sinks: the fallback channel for jobs nobody awaits.
//!
//! Awaitable jobs deliver their errors through their `JobHandle`. Plain jobs
//! and un-joined parallel batches have no handle, so workers report their
//! failures here instead.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::core::{JobError, JobKind};
use crate::util::clock::now_ms;
use crate::util::Priority;

/// A failed job that no completion handle observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    /// Index of the worker that ran the job.
    pub worker_id: usize,
    /// What kind of job failed.
    pub kind: JobKind,
    /// Priority the job was queued at.
    pub priority: Priority,
    /// The failure itself.
    pub error: JobError,
    /// Timestamp milliseconds.
    pub occurred_at_ms: u128,
}

impl FailureEvent {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn new(worker_id: usize, kind: JobKind, priority: Priority, error: JobError) -> Self {
        Self {
            worker_id,
            kind,
            priority,
            error,
            occurred_at_ms: now_ms(),
        }
    }
}

/// Failure sink abstraction. Called from worker threads.
pub trait FailureSink: Send + Sync {
    /// Record a failure.
    fn report(&self, event: FailureEvent);
}

/// Default sink: logs each failure with `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureSink;

impl FailureSink for TracingFailureSink {
    fn report(&self, event: FailureEvent) {
        tracing::error!(
            worker_id = event.worker_id,
            kind = %event.kind,
            priority = event.priority.value(),
            error = %event.error,
            "Untracked job failed"
        );
    }
}

/// In-memory sink for testing and dev. Keeps the most recent events.
#[derive(Debug)]
pub struct InMemoryFailureSink {
    events: Mutex<VecDeque<FailureEvent>>,
    max_events: usize,
}

impl InMemoryFailureSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events: max_events.max(1),
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<FailureEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no event has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl FailureSink for InMemoryFailureSink {
    fn report(&self, event: FailureEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}
