//! Infrastructure backing the scheduler: the shared job queue.

mod queue;

pub(crate) use queue::{JobQueue, QueueEntry};
