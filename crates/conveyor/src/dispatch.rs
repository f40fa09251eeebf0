// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::trace;

use crate::executor::ExecutorCore;

/// The ready-to-run form of a submission: a closure that executes the task body
/// and routes its outcome onto the owning execution. Boxed up for transit from
/// the dispatcher to whichever worker dequeues it.
pub(crate) type StartFn = Box<dyn FnOnce() + Send + 'static>;

/// The dispatcher's view of a submitted execution, with the result type erased:
/// the intake channel carries these, and the dispatcher either consumes the start
/// closure or rejects the whole submission.
pub(crate) trait PendingExecution: Send + Sync {
    /// Takes the start closure. `None` if it was already consumed.
    fn take_start(&self) -> Option<StartFn>;

    /// Transitions the execution to REJECTED and fires its completion signal.
    /// No-op if a terminal transition already won.
    fn reject(&self);
}

/// The single sequencer between submissions and workers.
///
/// Exactly one dispatcher exists per executor. It alone decides, per submission,
/// whether to place the task on the queue, grow the pool, wait for capacity or
/// reject - which makes it the serialization point for pool growth and gives the
/// intake-to-queue path FIFO ordering.
///
/// When the intake channel closes (shutdown, or the facade being dropped), the
/// dispatcher drains whatever was already accepted, closes the task channel so
/// workers can finish, and reports itself done.
pub(crate) struct Dispatcher {
    intake_rx: Receiver<Arc<dyn PendingExecution>>,
    task_tx: Sender<StartFn>,
    core: Arc<ExecutorCore>,
}

impl Dispatcher {
    pub(crate) fn new(
        intake_rx: Receiver<Arc<dyn PendingExecution>>,
        task_tx: Sender<StartFn>,
        core: Arc<ExecutorCore>,
    ) -> Self {
        Self {
            intake_rx,
            task_tx,
            core,
        }
    }

    /// Dispatcher thread entrypoint. Returns when the intake channel has been
    /// closed and drained.
    pub(crate) fn run(self) {
        let Self {
            intake_rx,
            task_tx,
            core,
        } = self;

        for submission in &intake_rx {
            Self::place(&core, &task_tx, &submission);
        }

        // Closing the task channel is what lets draining workers observe the end
        // of work; it must happen exactly once, here.
        drop(task_tx);
        core.mark_dispatch_done();
    }

    fn place(
        core: &Arc<ExecutorCore>,
        task_tx: &Sender<StartFn>,
        submission: &Arc<dyn PendingExecution>,
    ) {
        let Some(start) = submission.take_start() else {
            return;
        };

        let start = match task_tx.try_send(start) {
            Ok(()) => None,
            Err(TrySendError::Full(start)) => Some(start),
            Err(TrySendError::Disconnected(_)) => {
                submission.reject();
                return;
            }
        };

        // Grow when no worker is idle and the cap has room. The two counters are
        // read independently, so the picture can be stale: the cost is one extra
        // worker (still bounded by the cap) or growth delayed by one dispatch.
        if core.worker_running_count() == core.worker_count() && core.spawn_worker() {
            if let Some(start) = start {
                // The queue was full, but the worker spawned above is about to
                // start consuming; hand the task over even if we must wait.
                _ = task_tx.send(start);
            }
            return;
        }

        let Some(start) = start else {
            return;
        };

        if core.config().block_on_full_queue {
            _ = task_tx.send(start);
        } else {
            trace!(
                executor = core.name(),
                "task queue full and worker cap reached; rejecting execution"
            );
            submission.reject();
        }
    }
}
