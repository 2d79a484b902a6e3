//! Job traits and the internal work variants a worker executes.

use std::fmt;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::completion::Completer;
use crate::core::{AppResult, JobError};

/// A fire-and-forget unit of work.
///
/// Any `FnOnce() -> AppResult<()> + Send + 'static` closure is a `Job`. Use
/// [`FnJob`] (or `JobScheduler::spawn`) for a closure that cannot fail.
///
/// Errors and panics raised by `execute` never reach the caller; the worker
/// reports them to the scheduler's `FailureSink`.
///
/// # Example
///
/// ```rust,ignore
/// struct FlushTrace { path: PathBuf }
///
/// impl Job for FlushTrace {
///     fn execute(self: Box<Self>) -> AppResult<()> {
///         std::fs::write(&self.path, b"[]")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Job: Send + 'static {
    /// Run the job to completion on the calling worker thread.
    ///
    /// # Errors
    ///
    /// Any error is routed to the scheduler's failure sink.
    fn execute(self: Box<Self>) -> AppResult<()>;
}

impl<F> Job for F
where
    F: FnOnce() -> AppResult<()> + Send + 'static,
{
    fn execute(self: Box<Self>) -> AppResult<()> {
        (*self)()
    }
}

/// Adapter turning an infallible closure into a [`Job`].
pub struct FnJob<F>(pub F);

impl<F> Job for FnJob<F>
where
    F: FnOnce() + Send + 'static,
{
    fn execute(self: Box<Self>) -> AppResult<()> {
        (self.0)();
        Ok(())
    }
}

/// A per-index operation that parallel-for calls split into batches.
///
/// `execute` may be called concurrently from several workers, once for each
/// index in `[0, count)`.
pub trait ParallelJob: Send + Sync + 'static {
    /// Apply the operation to one index.
    fn execute(&self, index: usize);
}

impl<F> ParallelJob for F
where
    F: Fn(usize) + Send + Sync + 'static,
{
    fn execute(&self, index: usize) {
        self(index);
    }
}

/// Split `[0, count)` into contiguous half-open ranges of `batch_size`
/// elements. The last range may be shorter. A `batch_size` of `0` is treated
/// as `1`.
///
/// ```
/// use prometheus_job_scheduler::core::batch_ranges;
///
/// assert_eq!(batch_ranges(100, 32), vec![0..32, 32..64, 64..96, 96..100]);
/// assert!(batch_ranges(0, 32).is_empty());
/// ```
#[must_use]
pub fn batch_ranges(count: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..count)
        .step_by(batch_size)
        .map(|start| start..start.saturating_add(batch_size).min(count))
        .collect()
}

/// Join state shared by every batch of one `parallel_for` call.
pub(crate) struct BatchJoin {
    remaining: AtomicUsize,
    failure: Mutex<Option<JobError>>,
    completer: Mutex<Option<Completer<()>>>,
}

impl BatchJoin {
    pub(crate) fn new(batches: usize, completer: Completer<()>) -> Self {
        Self {
            remaining: AtomicUsize::new(batches),
            failure: Mutex::new(None),
            completer: Mutex::new(Some(completer)),
        }
    }

    /// Record one finished batch. The last batch completes the handle with
    /// the first recorded failure, if any.
    fn finish(&self, outcome: &Result<(), JobError>) {
        if let Err(err) = outcome {
            self.failure.lock().get_or_insert_with(|| err.clone());
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let completer = self.completer.lock().take();
        if let Some(completer) = completer {
            match self.failure.lock().take() {
                Some(err) => completer.reject(err),
                None => completer.resolve(()),
            }
        }
    }
}

/// One contiguous slice of a parallel-for call.
pub(crate) struct Batch {
    pub(crate) job: Arc<dyn ParallelJob>,
    pub(crate) range: Range<usize>,
    pub(crate) join: Option<Arc<BatchJoin>>,
}

/// Kind of work, for logs and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Fire-and-forget job.
    Plain,
    /// Awaitable lambda job backed by a `JobHandle`.
    Awaitable,
    /// One batch of a parallel-for call.
    Batch,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::Awaitable => "awaitable",
            Self::Batch => "batch",
        };
        f.write_str(name)
    }
}

/// Closed set of work items a worker can execute.
pub(crate) enum Work {
    /// Plain job; failures go to the failure sink.
    Plain(Box<dyn Job>),
    /// Lambda job. The closure owns its completer, runs the function and
    /// resolves or rejects the handle itself.
    Awaitable(Box<dyn FnOnce() -> Result<(), JobError> + Send>),
    /// Parallel-for batch, optionally joined by a handle.
    Batch(Batch),
}

impl Work {
    /// Wrap a lambda and its completer as awaitable work.
    pub(crate) fn awaitable<T, F>(f: F, completer: Completer<T>) -> Self
    where
        T: Send + 'static,
        F: FnOnce() -> AppResult<T> + Send + 'static,
    {
        Self::Awaitable(Box::new(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(JobError::from_anyhow(&err)),
                Err(payload) => Err(JobError::from_panic(payload.as_ref())),
            };
            let status = outcome.as_ref().map(|_| ()).map_err(JobError::clone);
            completer.complete(outcome);
            status
        }))
    }

    pub(crate) const fn kind(&self) -> JobKind {
        match self {
            Self::Plain(_) => JobKind::Plain,
            Self::Awaitable(_) => JobKind::Awaitable,
            Self::Batch(_) => JobKind::Batch,
        }
    }

    /// Whether a completion handle observes this work's outcome.
    pub(crate) const fn is_tracked(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Awaitable(_) => true,
            Self::Batch(batch) => batch.join.is_some(),
        }
    }

    /// Execute on the calling thread. Never unwinds.
    pub(crate) fn execute(self) -> Result<(), JobError> {
        match self {
            Self::Plain(job) => match panic::catch_unwind(AssertUnwindSafe(|| job.execute())) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(JobError::from_anyhow(&err)),
                Err(payload) => Err(JobError::from_panic(payload.as_ref())),
            },
            Self::Awaitable(run) => run(),
            Self::Batch(batch) => {
                let Batch { job, range, join } = batch;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    for index in range {
                        job.execute(index);
                    }
                }))
                .map_err(|payload| JobError::from_panic(payload.as_ref()));
                if let Some(join) = join {
                    join.finish(&outcome);
                }
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::completion::completion;

    #[test]
    fn test_batch_ranges_partition() {
        assert_eq!(batch_ranges(100, 32), vec![0..32, 32..64, 64..96, 96..100]);
        assert_eq!(batch_ranges(64, 32), vec![0..32, 32..64]);
        assert_eq!(batch_ranges(5, 10), vec![0..5]);
        assert!(batch_ranges(0, 8).is_empty());
    }

    #[test]
    fn test_batch_ranges_zero_batch_size() {
        assert_eq!(batch_ranges(3, 0), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_plain_work_reports_error_and_panic() {
        let failing = Work::Plain(Box::new(|| -> AppResult<()> { anyhow::bail!("bad input") }));
        assert_eq!(failing.execute(), Err(JobError::Failed("bad input".into())));

        let panicking = Work::Plain(Box::new(FnJob(|| panic!("exploded"))));
        assert_eq!(panicking.execute(), Err(JobError::Panicked("exploded".into())));
    }

    #[test]
    fn test_awaitable_work_resolves_handle() {
        let (completer, handle) = completion::<i32>();
        let work = Work::awaitable(|| Ok(27 + 19), completer);
        assert!(work.is_tracked());
        assert_eq!(work.execute(), Ok(()));
        assert_eq!(handle.wait(), Ok(46));
    }

    #[test]
    fn test_batch_join_completes_after_last_batch() {
        let (completer, handle) = completion::<()>();
        let join = Arc::new(BatchJoin::new(2, completer));
        let job: Arc<dyn ParallelJob> = Arc::new(|index: usize| assert!(index != 3, "index 3"));

        let first = Work::Batch(Batch {
            job: Arc::clone(&job),
            range: 0..2,
            join: Some(Arc::clone(&join)),
        });
        assert_eq!(first.execute(), Ok(()));
        assert!(!handle.is_finished());

        let second = Work::Batch(Batch {
            job,
            range: 2..4,
            join: Some(join),
        });
        assert!(second.execute().is_err());
        assert_eq!(handle.wait(), Err(JobError::Panicked("index 3".into())));
    }
}
