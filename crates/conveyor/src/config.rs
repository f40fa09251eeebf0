// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::env;

/// Construction parameters for an [`Executor`][crate::Executor].
///
/// The configuration is consumed (and normalized) at construction; an executor
/// cannot be reconfigured afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    /// Maximum number of concurrent workers. If `eager_initialization` is set they
    /// are all created at startup, otherwise on demand. A value of zero normalizes
    /// to the number of CPUs.
    pub concurrency: usize,

    /// Capacity of the task queue between the dispatcher and the workers. When the
    /// queue is full, no worker is idle and the worker cap is reached, a submission
    /// is either rejected or waited out, per `block_on_full_queue`.
    pub queue_size: usize,

    /// Create all `concurrency` workers at startup instead of on demand.
    pub eager_initialization: bool,

    /// When the pool is saturated, make the dispatcher wait for queue capacity
    /// (backpressure) instead of rejecting the submission.
    pub block_on_full_queue: bool,
}

impl Config {
    /// Preset for CPU-bound work: one worker per CPU, a small queue.
    ///
    /// Each field can be overridden through the
    /// `EXECUTOR_COMPUTATION_{CONCURRENCY,QUEUE_SIZE,EAGER_INITIALIZATION,BLOCK_ON_FULL_QUEUE}`
    /// environment variables.
    #[must_use]
    pub fn computation() -> Self {
        let cpus = num_cpus::get();

        Self {
            concurrency: env::usize_or("EXECUTOR_COMPUTATION_CONCURRENCY", cpus),
            queue_size: env::usize_or("EXECUTOR_COMPUTATION_QUEUE_SIZE", cpus * 16),
            eager_initialization: env::bool_or("EXECUTOR_COMPUTATION_EAGER_INITIALIZATION", false),
            block_on_full_queue: env::bool_or("EXECUTOR_COMPUTATION_BLOCK_ON_FULL_QUEUE", false),
        }
    }

    /// Preset for I/O-bound work: many workers per CPU, a deep queue.
    ///
    /// Each field can be overridden through the
    /// `EXECUTOR_IO_{CONCURRENCY,QUEUE_SIZE,EAGER_INITIALIZATION,BLOCK_ON_FULL_QUEUE}`
    /// environment variables.
    #[must_use]
    pub fn io() -> Self {
        let cpus = num_cpus::get();

        Self {
            concurrency: env::usize_or("EXECUTOR_IO_CONCURRENCY", cpus * 64),
            queue_size: env::usize_or("EXECUTOR_IO_QUEUE_SIZE", cpus * 1024),
            eager_initialization: env::bool_or("EXECUTOR_IO_EAGER_INITIALIZATION", false),
            block_on_full_queue: env::bool_or("EXECUTOR_IO_BLOCK_ON_FULL_QUEUE", false),
        }
    }

    /// Preset for strictly serialized work: a single worker.
    ///
    /// The queue size and flags can be overridden through the
    /// `EXECUTOR_SINGLE_{QUEUE_SIZE,EAGER_INITIALIZATION,BLOCK_ON_FULL_QUEUE}`
    /// environment variables; the concurrency is fixed at one.
    #[must_use]
    pub fn single() -> Self {
        Self {
            concurrency: 1,
            queue_size: env::usize_or("EXECUTOR_SINGLE_QUEUE_SIZE", 16),
            eager_initialization: env::bool_or("EXECUTOR_SINGLE_EAGER_INITIALIZATION", false),
            block_on_full_queue: env::bool_or("EXECUTOR_SINGLE_BLOCK_ON_FULL_QUEUE", false),
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.concurrency == 0 {
            self.concurrency = num_cpus::get();
        }

        self
    }
}
