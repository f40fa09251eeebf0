// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crossbeam_channel::select;
use scopeguard::defer;
use tracing::warn;

use crate::context::{CancelGuard, Context};
use crate::dispatch::{PendingExecution, StartFn};
use crate::once_signal::{OnceSignal, Signal};
use crate::status::ExecutionStatus;
use crate::task::{Args, TaskContext};
use crate::{ERR_POISONED_LOCK, Error, RecoveredPanic, Result, TaskError};

/// A handle to one submission: observe, await, or cancel its outcome.
///
/// The handle is created by [`Executor::submit`][crate::Executor::submit] and
/// moves through `WAITING -> RUNNING -> DONE` in the common case, or directly to
/// `REJECTED` / `CANCELLED`. Exactly one terminal outcome is ever committed, no
/// matter how many parties race for it; the completion signal fires exactly at
/// that transition and releases every waiter.
///
/// Cloning is cheap and every clone observes the same execution.
pub struct Execution<T> {
    inner: Arc<ExecutionInner<T>>,
}

pub(crate) struct ExecutionInner<T> {
    status: AtomicU8,

    /// The terminal-transition race gate. Whoever flips this commits the outcome;
    /// everyone else performs no side effects.
    stopped: AtomicBool,

    outcome: OnceLock<Result<T>>,
    done: OnceSignal,
    task_ctx: TaskContext,

    /// Cancels the derived context, so a body that is still running after the
    /// race has been decided can observe it and return early.
    cancel_guard: CancelGuard,

    /// Consumed by the dispatcher on first dispatch (or cleared on rejection).
    start: Mutex<Option<StartFn>>,
}

impl<T> Execution<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new<F>(ctx: &Context, args: Args, task: F) -> Self
    where
        F: FnOnce(TaskContext) -> std::result::Result<T, TaskError> + Send + 'static,
    {
        let (derived, cancel_guard) = ctx.with_cancel();

        let inner = Arc::new(ExecutionInner {
            status: AtomicU8::new(ExecutionStatus::Waiting as u8),
            stopped: AtomicBool::new(false),
            outcome: OnceLock::new(),
            done: OnceSignal::new(),
            task_ctx: TaskContext::new(derived, args),
            cancel_guard,
            start: Mutex::new(None),
        });

        let start: StartFn = Box::new({
            let inner = Arc::clone(&inner);
            move || inner.run(task)
        });
        *inner.start.lock().expect(ERR_POISONED_LOCK) = Some(start);

        Self { inner }
    }

    /// Blocks until the execution reaches a terminal state, then returns `self`
    /// so the outcome can be read in one expression: `execution.wait().get()`.
    pub fn wait(&self) -> &Self {
        self.inner.done.listen().wait();
        self
    }

    /// Blocks until the execution reaches a terminal state or `ctx` is cancelled.
    /// Reports the context's cause in the latter case; the task is unaffected.
    pub fn wait_with_context(&self, ctx: &Context) -> Result<()> {
        let done = self.inner.done.listen();
        let ctx_done = ctx.done();

        select! {
            recv(done.receiver()) -> _ => Ok(()),
            recv(ctx_done.receiver()) -> _ => Err(ctx.err().unwrap_or(Error::Cancelled)),
        }
    }

    /// Blocks until the execution reaches a terminal state or `timeout` elapses.
    /// Returns [`Error::Timeout`] in the latter case; the task is unaffected.
    pub fn wait_with_timeout(&self, timeout: Duration) -> Result<()> {
        if self.inner.done.listen().wait_timeout(timeout) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    /// Blocks until the execution reaches a terminal state or `deadline` passes.
    /// Returns [`Error::Timeout`] in the latter case; the task is unaffected.
    pub fn wait_with_deadline(&self, deadline: Instant) -> Result<()> {
        if self.inner.done.listen().wait_deadline(deadline) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    /// Attempts to cancel the execution. Returns whether this call won the
    /// terminal-transition race; at most one call ever returns `true`, and a
    /// completed or rejected execution cannot be cancelled.
    ///
    /// Winning does not interrupt a body that is already running: the derived
    /// context is cancelled so the body can observe it and return early, and
    /// whatever it produces afterwards is discarded.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .inner
            .complete(ExecutionStatus::Cancelled, Err(Error::Cancelled));

        if cancelled {
            self.inner.cancel_guard.cancel();
        }

        cancelled
    }

    /// The committed outcome: `None` until the completion signal has fired,
    /// immutable afterwards. Callers normally [`wait`][Self::wait] first.
    #[must_use]
    pub fn get(&self) -> Option<&Result<T>> {
        self.inner.outcome.get()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    /// One-shot event that fires at the terminal transition, for composition in
    /// caller select sets.
    #[must_use]
    pub fn done(&self) -> Signal {
        self.inner.done.listen()
    }

    pub(crate) fn as_pending(&self) -> Arc<dyn PendingExecution> {
        Arc::clone(&self.inner) as Arc<dyn PendingExecution>
    }

    pub(crate) fn reject_now(&self) {
        self.inner.reject();
    }
}

impl<T> ExecutionInner<T>
where
    T: Send + Sync + 'static,
{
    /// Executes the task body. Invoked on a worker; every outcome (value, error,
    /// panic) funnels into the same race-gated completion.
    fn run<F>(&self, task: F)
    where
        F: FnOnce(TaskContext) -> std::result::Result<T, TaskError>,
    {
        // Matches the cancel the caller would otherwise owe: once the body has
        // returned, the derived context has no further use and releasing it
        // unparks the watcher of the derivation.
        defer! {
            self.cancel_guard.cancel();
        }

        // A cancellation may already have won; the body still runs (it is expected
        // to observe its context), so the status only moves if WAITING is intact.
        _ = self.status.compare_exchange(
            ExecutionStatus::Waiting as u8,
            ExecutionStatus::Running as u8,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );

        let outcome = match catch_unwind(AssertUnwindSafe(|| task(self.task_ctx.clone()))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(Error::Task(error)),
            Err(payload) => {
                let recovered = RecoveredPanic::from_payload(payload.as_ref());
                warn!(value = recovered.value(), "task body panicked");
                Err(Error::Panicked(recovered))
            }
        };

        _ = self.complete(ExecutionStatus::Done, outcome);
    }

    /// The single terminal transition. Returns whether this caller won the race;
    /// the loser's outcome is dropped.
    fn complete(&self, status: ExecutionStatus, outcome: Result<T>) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }

        _ = self.outcome.set(outcome);
        self.status.store(status as u8, Ordering::Release);
        self.done.fire();

        true
    }
}

impl<T> PendingExecution for ExecutionInner<T>
where
    T: Send + Sync + 'static,
{
    fn take_start(&self) -> Option<StartFn> {
        self.start.lock().expect(ERR_POISONED_LOCK).take()
    }

    fn reject(&self) {
        // The start closure holds a reference back to this execution; clearing it
        // here breaks the cycle for submissions that are never dispatched.
        drop(self.take_start());

        if self.complete(ExecutionStatus::Rejected, Err(Error::Rejected)) {
            self.cancel_guard.cancel();
        }
    }
}

impl<T> Clone for Execution<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Execution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field(
                "status",
                &ExecutionStatus::from_u8(self.inner.status.load(Ordering::Acquire)),
            )
            .finish_non_exhaustive()
    }
}
