// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crossbeam_channel::{Receiver, select};
use scopeguard::defer;
use tracing::trace;

use crate::dispatch::StartFn;
use crate::executor::ExecutorCore;
use crate::once_signal::Signal;

/// A long-lived consumer of the task channel.
///
/// Each worker owns one thread and loops over three events: a task arriving
/// (execute it, bracketing the running counter), a retire message (exit), or the
/// executor's shutdown signal (switch to drain mode: execute whatever is still
/// queued, then exit once the dispatcher closes the channel).
///
/// Task bodies run behind the execution's panic barrier, so a fault never takes
/// the worker down; it keeps serving the next task.
pub(crate) struct Worker {
    task_rx: Receiver<StartFn>,
    stop_rx: Receiver<()>,
    shutdown: Signal,
    core: Arc<ExecutorCore>,
}

impl Worker {
    pub(crate) fn new(
        task_rx: Receiver<StartFn>,
        stop_rx: Receiver<()>,
        shutdown: Signal,
        core: Arc<ExecutorCore>,
    ) -> Self {
        Self {
            task_rx,
            stop_rx,
            shutdown,
            core,
        }
    }

    /// Worker thread entrypoint.
    pub(crate) fn run(self) {
        let core = Arc::clone(&self.core);
        defer! {
            core.on_worker_exit();
        }

        loop {
            select! {
                recv(self.task_rx) -> message => match message {
                    Ok(start) => self.execute(start),
                    // The dispatcher closed the task channel: no work will ever arrive again.
                    Err(_) => break,
                },
                recv(self.stop_rx) -> _ => break,
                recv(self.shutdown.receiver()) -> _ => {
                    self.drain();
                    break;
                }
            }
        }

        trace!(executor = self.core.name(), "worker exiting");
    }

    fn execute(&self, start: StartFn) {
        self.core.worker_started_task();
        defer! {
            self.core.worker_finished_task();
        }

        start();
    }

    /// Shutdown mode: everything already accepted onto the task channel still
    /// gets executed; the loop ends when the dispatcher closes the channel and
    /// the backlog is gone.
    fn drain(&self) {
        while let Ok(start) = self.task_rx.recv() {
            self.execute(start);
        }
    }
}
