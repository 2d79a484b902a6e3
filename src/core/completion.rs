//! Single-assignment completion handles for awaitable jobs.
//!
//! A `JobHandle<T>` is the caller's side; the worker holds the matching
//! `Completer<T>`. The completer stores the outcome once and then wakes
//! every waiter:
//!
//! - blocked threads through a `parking_lot::Condvar`,
//! - async tasks through their registered `Waker`s.
//!
//! Waking only schedules the awaiting task on its own executor, so caller
//! continuations never run on a worker thread.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures::future::{FutureExt, Shared};
use parking_lot::{Condvar, Mutex};

use crate::core::JobError;

/// Slot state.
enum SlotState<T> {
    /// Waiting for the job to finish.
    Pending,
    /// Outcome stored, not yet taken.
    Ready(Result<T, JobError>),
    /// Outcome handed to the caller.
    Taken,
}

struct Slot<T> {
    state: SlotState<T>,
    wakers: Vec<Waker>,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Inner<T> {
    /// Store the outcome if none was stored yet. Waiters are woken after the
    /// slot lock is released.
    fn fulfil(&self, outcome: Result<T, JobError>) {
        let wakers = {
            let mut slot = self.slot.lock();
            if !matches!(slot.state, SlotState::Pending) {
                return;
            }
            slot.state = SlotState::Ready(outcome);
            mem::take(&mut slot.wakers)
        };
        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }
}

/// Create a connected completer/handle pair.
pub(crate) fn completion<T>() -> (Completer<T>, JobHandle<T>) {
    let inner = Arc::new(Inner {
        slot: Mutex::new(Slot {
            state: SlotState::Pending,
            wakers: Vec::new(),
        }),
        ready: Condvar::new(),
    });
    (
        Completer {
            inner: Some(Arc::clone(&inner)),
        },
        JobHandle { inner },
    )
}

/// Worker-side half of a completion handle.
///
/// Dropping a completer that was never completed rejects the handle with
/// `JobError::Abandoned`.
pub(crate) struct Completer<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(mut self, outcome: Result<T, JobError>) {
        if let Some(inner) = self.inner.take() {
            inner.fulfil(outcome);
        }
    }

    pub(crate) fn resolve(self, value: T) {
        self.complete(Ok(value));
    }

    pub(crate) fn reject(self, error: JobError) {
        self.complete(Err(error));
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.fulfil(Err(JobError::Abandoned));
        }
    }
}

/// Completion handle returned by `JobScheduler::run_async` and friends.
///
/// The handle is resolved or rejected exactly once. It can be awaited as a
/// future from any async runtime, waited on synchronously with
/// [`JobHandle::wait`], or turned into a cloneable future with
/// [`JobHandle::shared`] so several awaiters observe the same outcome.
///
/// ```
/// use prometheus_job_scheduler::core::JobScheduler;
///
/// let scheduler = JobScheduler::with_workers(2).unwrap();
/// let handle = scheduler.run_async(|| 27 + 19);
/// assert_eq!(handle.wait(), Ok(46));
/// ```
#[must_use = "dropping a JobHandle discards the job's result"]
pub struct JobHandle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> JobHandle<T> {
    /// Whether the outcome is available to take. `false` again once the
    /// handle has been polled to completion through `&mut`.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.inner.slot.lock().state, SlotState::Ready(_))
    }

    /// Block the current thread until the job has finished, or `timeout`
    /// elapses. Returns `true` if the outcome is available to take.
    #[must_use]
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut slot = self.inner.slot.lock();
        if matches!(slot.state, SlotState::Pending) {
            let _ = self.inner.ready.wait_while_for(
                &mut slot,
                |slot| matches!(slot.state, SlotState::Pending),
                timeout,
            );
        }
        matches!(slot.state, SlotState::Ready(_))
    }

    /// Block the current thread until the job has finished and return its outcome.
    ///
    /// Prefer `.await` from async code; this parks the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the `JobError` the job was rejected with.
    ///
    /// # Panics
    ///
    /// The outcome can be taken once. Panics if the handle was already polled
    /// to `Poll::Ready`, e.g. by awaiting `&mut handle` inside `select!`.
    pub fn wait(self) -> Result<T, JobError> {
        let mut slot = self.inner.slot.lock();
        self.inner
            .ready
            .wait_while(&mut slot, |slot| matches!(slot.state, SlotState::Pending));
        take_outcome(&mut slot)
    }

    /// Convert into a cloneable future. Every clone resolves to the same outcome.
    pub fn shared(self) -> Shared<Self>
    where
        T: Clone,
    {
        FutureExt::shared(self)
    }
}

fn take_outcome<T>(slot: &mut Slot<T>) -> Result<T, JobError> {
    match mem::replace(&mut slot.state, SlotState::Taken) {
        SlotState::Ready(outcome) => outcome,
        SlotState::Pending | SlotState::Taken => {
            panic!("JobHandle outcome taken twice")
        }
    }
}

/// Polling after `Poll::Ready` was returned panics.
impl<T> Future for JobHandle<T> {
    type Output = Result<T, JobError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.inner.slot.lock();
        if !matches!(slot.state, SlotState::Pending) {
            return Poll::Ready(take_outcome(&mut slot));
        }
        if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> std::fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
