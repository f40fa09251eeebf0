// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A general-purpose task executor: user-supplied units of work run on a bounded
//! pool of workers fed through a bounded queue, and every submission returns an
//! [`Execution`] handle through which the outcome can be awaited, inspected or
//! cancelled.
//!
//! Workers are created lazily up to the configured concurrency (or eagerly, if
//! asked). A single dispatcher serializes placement and pool growth, so
//! submissions flow from intake to the task queue in FIFO order. Graceful
//! shutdown drains everything already accepted, rejects everything new, and
//! signals completion exactly once.
//!
//! ```
//! use conveyor::{Config, Context, Executor};
//!
//! let executor = Executor::new("example", Config::single());
//!
//! let execution = executor.submit(&Context::background(), |_ctx| Ok(2 + 2), []);
//! assert!(matches!(execution.wait().get(), Some(Ok(4))));
//!
//! executor.shutdown().done().wait();
//! ```

// Public API surface.
mod config;
mod context;
mod error;
mod execution;
mod executor;
mod once_signal;
mod status;
mod task;

pub use config::*;
pub use context::*;
pub use error::*;
pub use execution::*;
pub use executor::*;
pub use once_signal::Signal;
pub use status::*;
pub use task::*;

// Internal to the crate but re-exported at crate root for reduced hassle.
mod constants;
mod dispatch;
mod env;
mod worker;

pub(crate) use constants::ERR_POISONED_LOCK;
