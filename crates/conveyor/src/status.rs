// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

/// Lifecycle state of an [`Executor`][crate::Executor].
///
/// The executor starts `Running`, moves to `Terminating` when shutdown begins and
/// to `Terminated` when the last worker has exited. Terminal states are absorbing;
/// an executor never restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExecutorStatus {
    /// Accepting submissions and executing tasks.
    Running = 0,

    /// Shutdown has begun: new submissions are rejected, in-flight work is draining.
    Terminating = 1,

    /// All workers have exited. Nothing will ever run again.
    Terminated = 2,
}

impl ExecutorStatus {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Terminating,
            _ => Self::Terminated,
        }
    }

    /// Whether the executor is accepting submissions.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether shutdown has begun but workers are still draining.
    #[must_use]
    pub const fn is_terminating(self) -> bool {
        matches!(self, Self::Terminating)
    }

    /// Whether the executor has fully stopped.
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "RUNNING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
        })
    }
}

/// Lifecycle state of an [`Execution`][crate::Execution] handle.
///
/// `Rejected`, `Cancelled` and `Done` are terminal: exactly one of them is ever
/// committed, and the handle's completion signal fires at that transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExecutionStatus {
    /// Submitted but not yet picked up by a worker.
    Waiting = 0,

    /// A worker has begun executing the task body.
    Running = 1,

    /// The executor refused the submission.
    Rejected = 2,

    /// A cancellation won the race against completion.
    Cancelled = 3,

    /// The task body finished (successfully, with an error, or by panicking).
    Done = 4,
}

impl ExecutionStatus {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Waiting,
            1 => Self::Running,
            2 => Self::Rejected,
            3 => Self::Cancelled,
            _ => Self::Done,
        }
    }

    /// Whether the execution has not yet been picked up by a worker.
    #[must_use]
    pub const fn is_waiting(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Whether a worker is currently executing the task body.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the executor refused the submission.
    #[must_use]
    pub const fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Whether a cancellation won the race against completion.
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the task body ran to completion.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether this state is absorbing.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Done)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::Done => "DONE",
        })
    }
}
