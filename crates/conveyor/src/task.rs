// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::Error;
use crate::context::Context;
use crate::once_signal::Signal;

/// An opaque value in a task's argument vector.
pub type ArgValue = Arc<dyn Any + Send + Sync>;

/// The ordered argument vector captured at submit time and exposed to the task
/// through [`TaskContext::args`].
///
/// Values are opaque; readers recover them positionally with a typed
/// [`get`][Self::get]. Prefer capturing state in the task closure itself - this
/// container exists for call sites that assemble submissions generically.
#[derive(Clone, Default)]
pub struct Args {
    values: Vec<ArgValue>,
}

impl Args {
    /// Creates an empty argument vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value, builder-style.
    #[must_use]
    pub fn with(mut self, value: impl Any + Send + Sync) -> Self {
        self.values.push(Arc::new(value));
        self
    }

    /// The value at `index`, if present and of type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(|value| value.downcast_ref())
    }

    /// Number of captured values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vector is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the raw values in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &ArgValue> {
        self.values.iter()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.values.len()).finish()
    }
}

/// A per-submission customization passed to
/// [`Executor::submit`][crate::Executor::submit].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TaskOption {
    /// Supplies the argument vector the task observes through
    /// [`TaskContext::args`].
    Args(Args),
}

/// The read-only view a task body receives: the submit-time argument vector plus
/// the cancellation context derived from the caller's context.
///
/// The context is a cancellable child of the caller's: it is cancelled when the
/// caller's context is cancelled or when the execution handle is cancelled, so a
/// cooperative task body can observe either through [`done`][Self::done] /
/// [`err`][Self::err] and return early.
#[derive(Debug, Clone)]
pub struct TaskContext {
    ctx: Context,
    args: Args,
}

impl TaskContext {
    pub(crate) fn new(ctx: Context, args: Args) -> Self {
        Self { ctx, args }
    }

    /// The argument vector captured at submit time.
    #[must_use]
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// The effective deadline, if the caller's context carries one.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.ctx.deadline()
    }

    /// One-shot event that fires when the task should stop working.
    #[must_use]
    pub fn done(&self) -> Signal {
        self.ctx.done()
    }

    /// Why the task should stop working, or `None` while it should keep going.
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        self.ctx.err()
    }

    /// Whether the task should stop working.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.ctx.err().is_some()
    }

    /// Looks up a request-scoped value from the caller's context.
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.ctx.value(key)
    }
}
