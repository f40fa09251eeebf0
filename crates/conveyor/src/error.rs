// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::backtrace::Backtrace;

use thiserror::Error;

// `thiserror`'s derive auto-detects a field typed `Backtrace` (by the literal
// identifier in the field's type path) and emits an `Error::provide` impl that
// requires the unstable `error_generic_member_access` feature, which is not
// enabled on this crate's supported stable toolchain. Referencing the field
// through this alias keeps the type identical while avoiding that detection.
type Stack = Backtrace;

/// A specialized `Result` type for executor operations
/// that return an executor [`Error`][enum@Error] on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type task bodies return. Any error the task produces is carried to the
/// waiting caller unchanged, wrapped in [`Error::Task`].
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// An error recorded on an execution handle or returned from a wait.
///
/// This is an umbrella type for every way a submission can fail to deliver a value:
/// decisions made by the executor (rejection), decisions made by the caller
/// (cancellation), timed waits giving up, faults in the task body, and errors the
/// task body itself returns. Future versions may add additional enum variants.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The executor refused the submission: it is shutting down, or the task queue
    /// was full with no capacity to grow and backpressure disabled.
    #[error("execution_rejected")]
    Rejected,

    /// A cancellation won the race against the task's completion. The task body may
    /// still run (or even still be running); its outcome is discarded.
    #[error("execution_cancelled")]
    Cancelled,

    /// A context deadline elapsed before the awaited event occurred.
    #[error("deadline_exceeded")]
    DeadlineExceeded,

    /// A timed wait gave up. This is a property of the wait, not of the execution -
    /// the task keeps running and may still complete normally.
    #[error("execution_timeout")]
    Timeout,

    /// The task body panicked. The panic was confined to the execution and the
    /// worker that ran it keeps serving tasks.
    #[error(transparent)]
    Panicked(#[from] RecoveredPanic),

    /// We are re-packaging an error returned by the task body
    /// without adding further details in the executor layer.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// A panic captured from a task body, carrying the panic payload (stringified) and
/// a stack snapshot taken at the capture site.
#[derive(Debug, Error)]
#[error("panic: {value}\nstacktrace:\n{stack}")]
pub struct RecoveredPanic {
    value: String,
    stack: Stack,
}

impl RecoveredPanic {
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let value = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unprintable panic payload".to_owned());

        Self {
            value,
            stack: Backtrace::force_capture(),
        }
    }

    /// The panic payload, stringified. Payloads that are neither `&str` nor `String`
    /// are replaced by a placeholder.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The stack captured when the panic was recovered.
    #[must_use]
    pub fn stack(&self) -> &Backtrace {
        &self.stack
    }
}
