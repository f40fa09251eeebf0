// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::Context;
use crate::dispatch::{Dispatcher, PendingExecution, StartFn};
use crate::execution::Execution;
use crate::once_signal::{OnceSignal, Signal};
use crate::status::ExecutorStatus;
use crate::task::{Args, TaskContext, TaskOption};
use crate::worker::Worker;
use crate::{ERR_POISONED_LOCK, TaskError};

/// A bounded pool of workers fed through a bounded queue.
///
/// Submissions enter through [`submit`][Self::submit], which returns an
/// [`Execution`] handle immediately; a single dispatcher places each submission
/// on the task queue, growing the pool up to the configured concurrency when
/// every worker is busy. What happens once both the queue and the pool are
/// saturated is governed by [`Config::block_on_full_queue`].
///
/// [`shutdown`][Self::shutdown] stops intake, lets the queue drain, and fires
/// [`done`][Self::done] once the last worker has exited. Dropping the executor
/// without shutting it down also winds the threads down (nothing new can be
/// submitted through a dropped handle), but does not reach `TERMINATED` and
/// never fires `done`.
///
/// # Thread safety
///
/// This type is thread-safe; share it between threads via `Arc`.
#[derive(Debug)]
pub struct Executor {
    core: Arc<ExecutorCore>,
    /// Dropped on shutdown to close the intake channel. Submissions clone the
    /// sender out of the lock, so an in-flight submit keeps the channel open
    /// just long enough to be drained by the dispatcher.
    intake_tx: Mutex<Option<Sender<Arc<dyn PendingExecution>>>>,
}

impl Executor {
    /// Creates an executor and starts its dispatcher (and, with
    /// [`Config::eager_initialization`], all of its workers).
    #[must_use]
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let name = name.into();
        let config = config.normalized();

        let (task_tx, task_rx) = bounded(config.queue_size);
        let (intake_tx, intake_rx) = bounded(config.queue_size);
        let (stop_tx, stop_rx) = bounded(config.concurrency);

        let core = Arc::new(ExecutorCore {
            name,
            config,
            status: AtomicU8::new(ExecutorStatus::Running as u8),
            stopped: AtomicBool::new(false),
            dispatch_done: AtomicBool::new(false),
            worker_count: AtomicUsize::new(0),
            worker_running_count: AtomicUsize::new(0),
            shutdown: OnceSignal::new(),
            done: OnceSignal::new(),
            task_rx,
            stop_tx,
            stop_rx,
        });

        core.initialize_workers();

        let dispatcher = Dispatcher::new(intake_rx, task_tx, Arc::clone(&core));
        _ = thread::Builder::new()
            .name(format!("{}-dispatcher", core.name))
            .spawn(move || dispatcher.run())
            .expect("failed to spawn dispatcher thread");

        debug!(
            executor = core.name.as_str(),
            concurrency = core.config.concurrency,
            queue_size = core.config.queue_size,
            "executor started"
        );

        Self {
            core,
            intake_tx: Mutex::new(Some(intake_tx)),
        }
    }

    /// Submits a task, returning its handle immediately.
    ///
    /// The task observes `ctx` (and handle-level cancellation) through its
    /// [`TaskContext`]. If the executor is already shutting down, the returned
    /// handle is terminal with [`Error::Rejected`][crate::Error::Rejected].
    /// On a healthy executor this blocks only on intake backpressure.
    pub fn submit<T, F>(
        &self,
        ctx: &Context,
        task: F,
        options: impl IntoIterator<Item = TaskOption>,
    ) -> Execution<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(TaskContext) -> std::result::Result<T, TaskError> + Send + 'static,
    {
        let mut args = Args::default();
        for option in options {
            match option {
                TaskOption::Args(values) => args = values,
            }
        }

        let execution = Execution::new(ctx, args, task);

        if self.core.stopped.load(Ordering::Acquire) {
            execution.reject_now();
            return execution;
        }

        let sender = self
            .intake_tx
            .lock()
            .expect(ERR_POISONED_LOCK)
            .as_ref()
            .cloned();

        match sender {
            Some(sender) => {
                if sender.send(execution.as_pending()).is_err() {
                    // The dispatcher is gone; nothing will ever place this one.
                    execution.reject_now();
                }
            }
            None => execution.reject_now(),
        }

        execution
    }

    /// Begins graceful shutdown and returns immediately: the status moves to
    /// `TERMINATING`, new submissions are rejected, everything already accepted
    /// still runs, and [`done`][Self::done] fires once the last worker exits.
    ///
    /// Idempotent: calls after the first are no-ops. Shutdown cannot fail.
    pub fn shutdown(&self) -> &Self {
        if self.core.stopped.swap(true, Ordering::AcqRel) {
            return self;
        }

        debug!(executor = self.core.name.as_str(), "executor shutting down");

        self.core
            .status
            .store(ExecutorStatus::Terminating as u8, Ordering::Release);
        self.core.shutdown.fire();
        drop(self.intake_tx.lock().expect(ERR_POISONED_LOCK).take());

        self
    }

    /// Snapshot of the executor lifecycle state.
    #[must_use]
    pub fn status(&self) -> ExecutorStatus {
        ExecutorStatus::from_u8(self.core.status.load(Ordering::Acquire))
    }

    /// One-shot event that fires when shutdown completes (status `TERMINATED`,
    /// no workers left).
    #[must_use]
    pub fn done(&self) -> Signal {
        self.core.done.listen()
    }

    /// The diagnostic label given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Number of live workers. A diagnostic snapshot; never exceeds the
    /// configured concurrency.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.core.worker_count()
    }

    /// Number of workers currently executing a task. A diagnostic snapshot;
    /// never exceeds [`worker_count`][Self::worker_count].
    #[must_use]
    pub fn worker_running_count(&self) -> usize {
        self.core.worker_running_count()
    }
}

/// State shared between the facade, the dispatcher and the workers.
#[derive(Debug)]
pub(crate) struct ExecutorCore {
    name: String,
    config: Config,
    status: AtomicU8,
    stopped: AtomicBool,
    dispatch_done: AtomicBool,
    worker_count: AtomicUsize,
    worker_running_count: AtomicUsize,
    shutdown: OnceSignal,
    done: OnceSignal,

    /// Prototype receiver cloned into each spawned worker. Also keeps a receiver
    /// alive for the dispatcher's sends while the pool is still empty.
    task_rx: Receiver<StartFn>,

    /// One message retires one worker. Held for future growth; only tests send.
    #[cfg_attr(
        not(test),
        expect(dead_code, reason = "retirement is reserved for future worker shrinkage")
    )]
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl ExecutorCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    pub(crate) fn worker_running_count(&self) -> usize {
        self.worker_running_count.load(Ordering::Acquire)
    }

    fn initialize_workers(self: &Arc<Self>) {
        if !self.config.eager_initialization {
            return;
        }

        for _ in 0..self.config.concurrency {
            _ = self.spawn_worker();
        }
    }

    /// Spawns one worker unless the cap is reached. Only the dispatcher (and
    /// eager initialization, which runs before the dispatcher exists) calls
    /// this, so the count check does not race with other growth.
    pub(crate) fn spawn_worker(self: &Arc<Self>) -> bool {
        if self.worker_count.load(Ordering::Acquire) >= self.config.concurrency {
            return false;
        }

        let index = self.worker_count.fetch_add(1, Ordering::AcqRel);

        let worker = Worker::new(
            self.task_rx.clone(),
            self.stop_rx.clone(),
            self.shutdown.listen(),
            Arc::clone(self),
        );

        let spawned = thread::Builder::new()
            .name(format!("{}-worker-{index}", self.name))
            .spawn(move || worker.run());

        match spawned {
            Ok(_) => true,
            Err(error) => {
                // Roll back so growth reports failure and the dispatcher falls
                // through to its block/reject arm instead of handing work to a
                // worker that never started.
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                warn!(
                    executor = self.name.as_str(),
                    %error,
                    "failed to spawn worker thread"
                );
                false
            }
        }
    }

    pub(crate) fn worker_started_task(&self) {
        self.worker_running_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn worker_finished_task(&self) {
        self.worker_running_count.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn on_worker_exit(&self) {
        self.worker_count.fetch_sub(1, Ordering::AcqRel);
        self.try_finalize();
    }

    pub(crate) fn mark_dispatch_done(&self) {
        self.dispatch_done.store(true, Ordering::Release);
        self.try_finalize();
    }

    /// The terminal transition of the executor itself: performed by whichever
    /// party (last exiting worker, or the dispatcher when no workers remain)
    /// first observes the fully drained state after shutdown.
    fn try_finalize(&self) {
        if !self.stopped.load(Ordering::Acquire)
            || !self.dispatch_done.load(Ordering::Acquire)
            || self.worker_count.load(Ordering::Acquire) != 0
        {
            return;
        }

        let finalized = self
            .status
            .compare_exchange(
                ExecutorStatus::Terminating as u8,
                ExecutorStatus::Terminated as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if finalized {
            debug!(executor = self.name.as_str(), "executor terminated");
            self.done.fire();
        }
    }

    /// Retires one worker through the stop channel.
    #[cfg(test)]
    pub(crate) fn retire_one_worker(&self) {
        _ = self.stop_tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use conveyor_testing::{TEST_TIMEOUT, execute_or_abandon};

    use super::*;

    fn small_executor(name: &str, config: Config) -> Executor {
        Executor::new(name, config)
    }

    #[test]
    fn new_executor_is_running_and_named() {
        let executor = small_executor(
            "unit-new",
            Config {
                concurrency: 1,
                queue_size: 4,
                ..Config::default()
            },
        );

        assert_eq!(executor.name(), "unit-new");
        assert!(executor.status().is_running());
        assert_eq!(executor.worker_count(), 0);
        assert_eq!(executor.worker_running_count(), 0);
    }

    #[test]
    fn eager_initialization_spawns_all_workers() {
        let executor = small_executor(
            "unit-eager",
            Config {
                concurrency: 3,
                queue_size: 4,
                eager_initialization: true,
                ..Config::default()
            },
        );

        assert_eq!(executor.worker_count(), 3);
        assert_eq!(executor.worker_running_count(), 0);
    }

    #[test]
    fn lazy_executor_spawns_on_demand_up_to_cap() {
        let executor = small_executor(
            "unit-lazy",
            Config {
                concurrency: 2,
                queue_size: 16,
                ..Config::default()
            },
        );

        let execution = executor.submit(&Context::background(), |_| Ok(1_u32), []);
        assert!(execute_or_abandon(move || execution.wait().status()).is_some());

        assert!(executor.worker_count() >= 1);
        assert!(executor.worker_count() <= 2);
    }

    #[test]
    fn worker_count_never_exceeds_cap() {
        let executor = small_executor(
            "unit-cap",
            Config {
                concurrency: 2,
                queue_size: 16,
                eager_initialization: true,
                ..Config::default()
            },
        );

        // Direct growth attempts beyond the cap must be refused.
        assert!(!executor.core.spawn_worker());
        assert_eq!(executor.worker_count(), 2);
    }

    #[test]
    fn stop_channel_retires_a_worker() {
        let executor = small_executor(
            "unit-retire",
            Config {
                concurrency: 2,
                queue_size: 4,
                eager_initialization: true,
                ..Config::default()
            },
        );

        assert_eq!(executor.worker_count(), 2);

        executor.core.retire_one_worker();

        let core = Arc::clone(&executor.core);
        let retired = execute_or_abandon(move || {
            while core.worker_count() != 1 {
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        assert!(retired.is_some());
    }

    #[test]
    fn submit_after_drop_of_intake_rejects() {
        let executor = small_executor(
            "unit-closed-intake",
            Config {
                concurrency: 1,
                queue_size: 4,
                ..Config::default()
            },
        );

        // Simulate the shutdown race where the sender is already gone.
        drop(executor.intake_tx.lock().unwrap().take());

        let execution = executor.submit(&Context::background(), |_| Ok(()), []);
        assert!(execution.status().is_rejected());
    }

    #[test]
    fn done_fires_only_after_shutdown() {
        let executor = small_executor(
            "unit-done",
            Config {
                concurrency: 1,
                queue_size: 4,
                eager_initialization: true,
                ..Config::default()
            },
        );

        let done = executor.done();
        assert!(!done.is_fired());

        executor.shutdown();

        assert!(done.wait_timeout(TEST_TIMEOUT));
        assert!(executor.status().is_terminated());
        assert_eq!(executor.worker_count(), 0);
    }

    #[test]
    fn shutdown_with_no_workers_still_terminates() {
        let executor = small_executor(
            "unit-done-empty",
            Config {
                concurrency: 4,
                queue_size: 4,
                ..Config::default()
            },
        );

        executor.shutdown();

        assert!(executor.done().wait_timeout(TEST_TIMEOUT));
        assert!(executor.status().is_terminated());
    }
}
