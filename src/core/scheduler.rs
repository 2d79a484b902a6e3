//! Priority job scheduler backed by a fixed pool of OS worker threads.
//!
//! All workers consume from one shared priority queue. The queue is a binary
//! heap behind a `parking_lot::Mutex`; idle workers park on a
//! `parking_lot::Condvar` until an entry is pushed or shutdown begins.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on the condvar while the queue is empty
//! - **Short critical sections**: the lock covers heap mutation only, never
//!   job execution, handle wake-ups or dropping abandoned entries
//! - **Failure isolation**: every job runs under `catch_unwind`; a failing job
//!   never takes its worker down
//!
//! # Worker states
//!
//! `WaitingForWork -> Executing -> WaitingForWork -> ... -> Terminated`. A
//! worker terminates once shutdown has begun and the queue is empty.

use std::collections::HashSet;
use std::mem;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::builders::SchedulerBuilder;
use crate::config::{SchedulerConfig, ShutdownPolicy, WorkerPriority};
use crate::core::completion::{completion, JobHandle};
use crate::core::job::{batch_ranges, Batch, BatchJoin, FnJob, Job, ParallelJob, Work};
use crate::core::{AppResult, FailureEvent, FailureSink, SchedulerError};
use crate::infra::{JobQueue, QueueEntry};
use crate::util::Priority;

/// Statistics about scheduler utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Entries waiting in the queue.
    pub queued_jobs: u64,
    /// Entries currently executing.
    pub active_jobs: u64,
    /// Entries accepted into the queue. A parallel call counts once per batch.
    pub scheduled_jobs: u64,
    /// Entries that finished successfully.
    pub completed_jobs: u64,
    /// Entries that panicked or returned an error.
    pub failed_jobs: u64,
    /// Entries dropped without running.
    pub abandoned_jobs: u64,
}

/// Internal counters for scheduler statistics (thread-safe).
#[derive(Debug, Default)]
struct SchedulerCounters {
    active_jobs: AtomicU64,
    scheduled_jobs: AtomicU64,
    completed_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    abandoned_jobs: AtomicU64,
}

impl SchedulerCounters {
    fn snapshot(&self, worker_count: usize, queued_jobs: usize) -> SchedulerStats {
        SchedulerStats {
            worker_count,
            queued_jobs: queued_jobs as u64,
            active_jobs: self.active_jobs.load(Ordering::Relaxed),
            scheduled_jobs: self.scheduled_jobs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            abandoned_jobs: self.abandoned_jobs.load(Ordering::Relaxed),
        }
    }
}

/// State guarded by the queue mutex.
struct QueueState {
    queue: JobQueue,
    running: bool,
}

/// State shared between the scheduler handle and its workers.
struct Shared {
    state: Mutex<QueueState>,
    /// Signaled when an entry is pushed or shutdown begins.
    work_available: Condvar,
    counters: SchedulerCounters,
    failure_sink: Arc<dyn FailureSink>,
}

impl Shared {
    /// Block until an entry is available. Returns `None` once shutdown has
    /// begun and the queue is empty.
    fn next_entry(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.queue.pop() {
                return Some(entry);
            }
            if !state.running {
                return None;
            }
            self.work_available.wait(&mut state);
        }
    }

    fn run(&self, worker_id: usize, entry: QueueEntry) {
        let QueueEntry { priority, work, .. } = entry;
        let kind = work.kind();
        let tracked = work.is_tracked();

        self.counters.active_jobs.fetch_add(1, Ordering::Relaxed);
        debug!(
            worker_id = worker_id,
            kind = %kind,
            priority = priority.value(),
            "Worker executing job"
        );

        let outcome = work.execute();

        self.counters.active_jobs.fetch_sub(1, Ordering::Relaxed);
        match outcome {
            Ok(()) => {
                self.counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id = worker_id, kind = %kind, "Worker completed job");
            }
            Err(err) => {
                self.counters.failed_jobs.fetch_add(1, Ordering::Relaxed);
                if tracked {
                    debug!(
                        worker_id = worker_id,
                        kind = %kind,
                        error = %err,
                        "Job failed; error delivered to its handle"
                    );
                } else {
                    self.report(FailureEvent::new(worker_id, kind, priority, err));
                }
            }
        }
    }

    fn report(&self, event: FailureEvent) {
        let sink = &self.failure_sink;
        if panic::catch_unwind(AssertUnwindSafe(|| sink.report(event))).is_err() {
            error!("Failure sink panicked while reporting a job failure");
        }
    }
}

/// Sends the worker id on the exit channel when the worker thread ends.
struct ExitSignal {
    worker_id: usize,
    tx: Sender<usize>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.tx.send(self.worker_id);
    }
}

/// Priority job scheduler with a fixed pool of worker threads.
///
/// Lower [`Priority`] values are serviced first; `Priority::HIGHEST` (0)
/// is the most urgent. Equal priorities are serviced in arrival order.
///
/// Three ways to submit work:
///
/// - [`schedule`](Self::schedule): fire-and-forget [`Job`]
/// - [`run_async`](Self::run_async): closure whose result arrives through a
///   [`JobHandle`]
/// - [`schedule_parallel`](Self::schedule_parallel) /
///   [`parallel_for`](Self::parallel_for): a per-index [`ParallelJob`] split
///   into batches queued at `Priority::HIGHEST`
///
/// ```
/// use prometheus_job_scheduler::core::JobScheduler;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let scheduler = JobScheduler::with_workers(4).unwrap();
///
/// let visited = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&visited);
/// let done = scheduler.parallel_for(move |_index: usize| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// }, 100, 32);
/// done.wait().unwrap();
/// assert_eq!(visited.load(Ordering::Relaxed), 100);
///
/// scheduler.shutdown();
/// ```
pub struct JobScheduler {
    config: SchedulerConfig,
    worker_count: usize,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Worker ids arrive here as worker threads exit.
    exits: Receiver<usize>,
}

impl JobScheduler {
    /// Create a scheduler from configuration, reporting untracked failures
    /// through `tracing`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::Spawn` if a worker thread cannot be spawned
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        SchedulerBuilder::from_config(config).build()
    }

    /// Create a scheduler with `worker_count` workers and default settings.
    /// Zero or negative counts use `max(1, logical_cpus - 2)`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Spawn` if a worker thread cannot be spawned.
    pub fn with_workers(worker_count: i64) -> Result<Self, SchedulerError> {
        Self::new(SchedulerConfig::new().with_worker_count(worker_count))
    }

    /// Start building a scheduler.
    #[must_use]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn start(
        config: SchedulerConfig,
        failure_sink: Arc<dyn FailureSink>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let worker_count = config.resolved_worker_count();
        let (exit_tx, exits) = unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                queue: JobQueue::new(),
                running: true,
            }),
            work_available: Condvar::new(),
            counters: SchedulerCounters::default(),
            failure_sink,
        });

        let scheduler = Self {
            config,
            worker_count,
            shared,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            exits,
        };

        for worker_id in 0..worker_count {
            let shared = Arc::clone(&scheduler.shared);
            match spawn_worker(worker_id, &scheduler.config, shared, exit_tx.clone()) {
                Ok(handle) => scheduler.workers.lock().push(handle),
                Err(e) => {
                    error!(worker_id = worker_id, error = %e, "Failed to spawn worker thread");
                    scheduler.shutdown();
                    return Err(SchedulerError::Spawn(e));
                }
            }
        }

        info!(
            worker_count = worker_count,
            worker_priority = ?scheduler.config.worker_priority,
            shutdown_policy = ?scheduler.config.shutdown_policy,
            "JobScheduler initialized"
        );

        Ok(scheduler)
    }

    /// Queue a fire-and-forget job.
    ///
    /// Errors and panics from the job go to the failure sink. After
    /// [`shutdown`](Self::shutdown) has begun the job is dropped without
    /// running.
    pub fn schedule<J: Job>(&self, job: J, priority: Priority) {
        self.enqueue(priority, Work::Plain(Box::new(job)));
    }

    /// Queue a fire-and-forget job at the configured default priority.
    pub fn schedule_default<J: Job>(&self, job: J) {
        self.schedule(job, self.config.default_priority);
    }

    /// Queue an infallible closure at the configured default priority.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_default(FnJob(f));
    }

    /// Split `[0, count)` into `ceil(count / batch_size)` batches and queue
    /// them all at `Priority::HIGHEST` under one lock acquisition.
    ///
    /// No handle is returned; use [`parallel_for`](Self::parallel_for) to
    /// wait for the batches. A `batch_size` of `0` is treated as `1`.
    pub fn schedule_parallel<J: ParallelJob>(&self, job: J, count: usize, batch_size: usize) {
        self.enqueue_batches(Arc::new(job), batch_ranges(count, batch_size), None);
    }

    /// Like [`schedule_parallel`](Self::schedule_parallel), returning a handle
    /// that resolves once every batch has finished.
    ///
    /// The handle rejects with the first batch failure, still only after every
    /// batch has finished. With `count == 0` it resolves immediately.
    pub fn parallel_for<J: ParallelJob>(
        &self,
        job: J,
        count: usize,
        batch_size: usize,
    ) -> JobHandle<()> {
        let ranges = batch_ranges(count, batch_size);
        let (completer, handle) = completion();
        if ranges.is_empty() {
            completer.resolve(());
            return handle;
        }
        let join = Arc::new(BatchJoin::new(ranges.len(), completer));
        self.enqueue_batches(Arc::new(job), ranges, Some(join));
        handle
    }

    /// Run `f` on a worker at the default priority and return a handle to
    /// its result. A panic inside `f` rejects the handle with
    /// `JobError::Panicked`.
    pub fn run_async<T, F>(&self, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.run_async_with(self.config.default_priority, f)
    }

    /// [`run_async`](Self::run_async) at an explicit priority.
    pub fn run_async_with<T, F>(&self, priority: Priority, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit_awaitable(priority, move || Ok(f()))
    }

    /// Run a fallible closure on a worker. An `Err` rejects the handle with
    /// `JobError::Failed` carrying the error chain.
    pub fn try_run_async<T, F>(&self, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> AppResult<T> + Send + 'static,
    {
        self.submit_awaitable(self.config.default_priority, f)
    }

    fn submit_awaitable<T, F>(&self, priority: Priority, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> AppResult<T> + Send + 'static,
    {
        let (completer, handle) = completion();
        self.enqueue(priority, Work::awaitable(f, completer));
        handle
    }

    fn enqueue(&self, priority: Priority, work: Work) {
        let rejected = {
            let mut state = self.shared.state.lock();
            if state.running {
                state.queue.push(priority, work);
                None
            } else {
                Some(work)
            }
        };

        if let Some(work) = rejected {
            self.abandon(vec![work]);
            return;
        }

        self.shared.counters.scheduled_jobs.fetch_add(1, Ordering::Relaxed);
        self.shared.work_available.notify_one();
    }

    fn enqueue_batches(
        &self,
        job: Arc<dyn ParallelJob>,
        ranges: Vec<Range<usize>>,
        join: Option<Arc<BatchJoin>>,
    ) {
        let batches = ranges.len();
        if batches == 0 {
            return;
        }
        let works: Vec<Work> = ranges
            .into_iter()
            .map(|range| {
                Work::Batch(Batch {
                    job: Arc::clone(&job),
                    range,
                    join: join.clone(),
                })
            })
            .collect();
        drop(join);

        let rejected = {
            let mut state = self.shared.state.lock();
            if state.running {
                state.queue.extend(Priority::HIGHEST, works);
                None
            } else {
                Some(works)
            }
        };

        if let Some(works) = rejected {
            self.abandon(works);
            return;
        }

        self.shared
            .counters
            .scheduled_jobs
            .fetch_add(batches as u64, Ordering::Relaxed);
        debug!(batches = batches, "Parallel batches queued");
        self.shared.work_available.notify_all();
    }

    /// Drop work that was refused after shutdown.
    fn abandon(&self, works: Vec<Work>) {
        warn!(jobs = works.len(), "Job scheduled after shutdown; dropping it");
        self.shared
            .counters
            .abandoned_jobs
            .fetch_add(works.len() as u64, Ordering::Relaxed);
        drop(works);
    }

    /// Get current scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let queued = self.shared.state.lock().queue.len();
        self.shared.counters.snapshot(self.worker_count, queued)
    }

    /// Number of worker threads. Always at least one.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Configuration the scheduler was built from.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Whether the scheduler still accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Shut the scheduler down and wait for its workers.
    ///
    /// Stops accepting work, wakes every worker and waits up to
    /// `join_timeout_ms` for them to exit. In-flight jobs are never
    /// interrupted. Under `ShutdownPolicy::Drain` workers first finish every
    /// entry still queued; under `ShutdownPolicy::Abandon` queued entries are
    /// dropped and their handles reject with `JobError::Abandoned`.
    ///
    /// Idempotent; also called on drop.
    pub fn shutdown(&self) {
        let abandoned = {
            let mut state = self.shared.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            match self.config.shutdown_policy {
                ShutdownPolicy::Drain => Vec::new(),
                ShutdownPolicy::Abandon => state.queue.take_all(),
            }
        };
        self.shared.work_available.notify_all();

        info!(
            policy = ?self.config.shutdown_policy,
            abandoned = abandoned.len(),
            "Shutting down job scheduler"
        );
        if !abandoned.is_empty() {
            self.shared
                .counters
                .abandoned_jobs
                .fetch_add(abandoned.len() as u64, Ordering::Relaxed);
            drop(abandoned);
        }

        self.join_workers();
    }

    /// Join every worker that exits before the join timeout; detach the rest.
    fn join_workers(&self) {
        let workers = mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        let mut pending: Vec<(usize, JoinHandle<()>)> = Vec::with_capacity(workers.len());
        for (worker_id, worker) in workers.into_iter().enumerate() {
            if worker.thread().id() == current {
                debug!(worker_id = worker_id, "Shutdown called from a worker; not joining itself");
            } else {
                pending.push((worker_id, worker));
            }
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.join_timeout_ms);
        let mut exited = HashSet::with_capacity(pending.len());
        while exited.len() < pending.len() {
            match self.exits.recv_deadline(deadline) {
                Ok(worker_id) => {
                    exited.insert(worker_id);
                }
                Err(_) => break,
            }
        }

        let mut joined = 0;
        for (worker_id, worker) in pending {
            if !exited.contains(&worker_id) && !worker.is_finished() {
                warn!(worker_id = worker_id, "Worker did not exit within timeout - detaching");
                continue;
            }
            match worker.join() {
                Ok(()) => {
                    joined += 1;
                    debug!(worker_id = worker_id, "Worker joined successfully");
                }
                Err(_) => warn!(worker_id = worker_id, "Worker panicked"),
            }
        }

        info!(
            worker_count = self.worker_count,
            joined = joined,
            "Job scheduler shut down complete"
        );
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("worker_count", &self.worker_count)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Spawn a worker thread.
fn spawn_worker(
    worker_id: usize,
    config: &SchedulerConfig,
    shared: Arc<Shared>,
    exit_tx: Sender<usize>,
) -> std::io::Result<JoinHandle<()>> {
    let priority = config.worker_priority;
    thread::Builder::new()
        .name(format!("{}-{worker_id}", config.thread_name_prefix))
        .stack_size(config.thread_stack_size)
        .spawn(move || {
            let _exit = ExitSignal {
                worker_id,
                tx: exit_tx,
            };
            apply_worker_priority(worker_id, priority);
            debug!(worker_id = worker_id, "Worker thread started");

            while let Some(entry) = shared.next_entry() {
                shared.run(worker_id, entry);
            }

            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}

/// Lower the calling thread's OS priority when requested. Platforms that
/// refuse are logged and otherwise ignored.
fn apply_worker_priority(worker_id: usize, priority: WorkerPriority) {
    if priority == WorkerPriority::Normal {
        return;
    }
    match thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Min) {
        Ok(()) => debug!(worker_id = worker_id, "Worker thread priority lowered"),
        Err(e) => debug!(
            worker_id = worker_id,
            error = ?e,
            "Could not lower worker thread priority"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobError;

    fn scheduler(workers: i64) -> JobScheduler {
        JobScheduler::new(
            SchedulerConfig::new()
                .with_worker_count(workers)
                .with_worker_priority(WorkerPriority::Normal),
        )
        .unwrap()
    }

    #[test]
    fn test_run_async_basic() {
        let s = scheduler(2);
        assert_eq!(s.run_async(|| 27 + 19).wait(), Ok(46));

        // Counters are updated after the handle resolves; joining settles them
        s.shutdown();
        let stats = s.stats();
        assert_eq!(stats.worker_count, 2);
        assert_eq!(stats.scheduled_jobs, 1);
        assert_eq!(stats.completed_jobs, 1);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let s = scheduler(0);
        assert!(s.worker_count() >= 1);
        assert_eq!(s.run_async(|| "alive").wait(), Ok("alive"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = JobScheduler::new(SchedulerConfig::new().with_join_timeout_ms(0)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }

    #[test]
    fn test_oversized_worker_count_rejected() {
        let err = JobScheduler::with_workers(i64::MAX).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(msg) if msg.contains("worker_count")));
    }

    #[test]
    fn test_schedule_after_shutdown_is_abandoned() {
        let s = scheduler(1);
        s.shutdown();
        assert!(!s.is_running());

        let handle = s.run_async(|| 1);
        assert_eq!(handle.wait(), Err(JobError::Abandoned));
        assert_eq!(s.stats().abandoned_jobs, 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let s = scheduler(2);
        s.shutdown();
        s.shutdown();
        assert!(!s.is_running());
    }
}
