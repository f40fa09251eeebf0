// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{at, never, select};

use crate::Error;
use crate::once_signal::{OnceSignal, Signal};

/// A cancellation context: carries a cancellation event, an optional deadline and
/// request-scoped values from a caller down to the tasks it submits.
///
/// Contexts form a tree. Deriving a child with [`with_cancel`][Self::with_cancel]
/// or [`with_deadline`][Self::with_deadline] yields a context that is cancelled
/// when its guard says so, when its deadline passes, or when any ancestor is
/// cancelled - whichever comes first. Cancelling a child never affects its parent.
///
/// Cancellation is strictly cooperative: it makes [`done()`][Self::done] fire and
/// [`err()`][Self::err] report a cause, and it is up to the observing task to
/// notice and return.
///
/// # Thread safety
///
/// Cloning is cheap (the clone observes the same context) and all operations may
/// be used from any thread.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    cancel: Option<CancelState>,
    /// Effective deadline: the earliest deadline along the ancestor chain,
    /// computed once at derivation.
    deadline: Option<Instant>,
    value: Option<(&'static str, Arc<dyn Any + Send + Sync>)>,
    parent: Option<Context>,
}

#[derive(Debug)]
struct CancelState {
    signal: OnceSignal,
    cause: OnceLock<CancelCause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelCause {
    Cancelled,
    DeadlineExceeded,
}

/// A signal that never fires, handed out by contexts with no cancellable ancestor.
fn never_signal() -> Signal {
    static NEVER: OnceLock<OnceSignal> = OnceLock::new();

    NEVER.get_or_init(OnceSignal::new).listen()
}

impl Context {
    /// The root context: never cancelled, no deadline, no values.
    #[must_use]
    pub fn background() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                cancel: None,
                deadline: None,
                value: None,
                parent: None,
            }),
        }
    }

    /// Derives a cancellable child context. Cancellation of `self` propagates to
    /// the child; cancelling the child (through the returned guard) does not
    /// propagate upwards.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelGuard) {
        self.derive(self.deadline(), None)
    }

    /// Derives a cancellable child context that is additionally cancelled once
    /// `deadline` passes. A deadline inherited from an ancestor is kept if it is
    /// earlier.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelGuard) {
        let effective = match self.deadline() {
            Some(inherited) if inherited <= deadline => inherited,
            _ => deadline,
        };

        self.derive(Some(effective), Some(effective))
    }

    /// Derives a cancellable child context that is additionally cancelled once
    /// `timeout` elapses. See [`with_deadline`][Self::with_deadline].
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelGuard) {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child context carrying `value` under `key`. Lookups walk towards
    /// the root, so a child can shadow an ancestor's key.
    #[must_use]
    pub fn with_value(&self, key: &'static str, value: impl Any + Send + Sync) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                cancel: None,
                deadline: self.deadline(),
                value: Some((key, Arc::new(value))),
                parent: Some(self.clone()),
            }),
        }
    }

    /// One-shot event that fires when this context (or an ancestor) is cancelled
    /// or its deadline passes. For a context with no cancellable ancestor the
    /// returned signal never fires.
    #[must_use]
    pub fn done(&self) -> Signal {
        self.nearest_cancel()
            .map_or_else(never_signal, |cancel| cancel.signal.listen())
    }

    /// Why this context is no longer live: [`Error::Cancelled`] or
    /// [`Error::DeadlineExceeded`], or `None` while it is still live.
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        let mut current = self;

        loop {
            if let Some(cancel) = &current.inner.cancel
                && let Some(cause) = cancel.cause.get()
            {
                return Some(match cause {
                    CancelCause::Cancelled => Error::Cancelled,
                    CancelCause::DeadlineExceeded => Error::DeadlineExceeded,
                });
            }

            match &current.inner.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// The effective deadline, if any ancestor (or this context) set one.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Looks up a request-scoped value by key, walking towards the root.
    /// Returns `None` if the key is absent or holds a value of a different type.
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let mut current = self;

        loop {
            if let Some((stored_key, stored_value)) = &current.inner.value
                && *stored_key == key
            {
                return Arc::clone(stored_value).downcast::<T>().ok();
            }

            match &current.inner.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    fn derive(&self, deadline: Option<Instant>, timer: Option<Instant>) -> (Self, CancelGuard) {
        let child = Self {
            inner: Arc::new(ContextInner {
                cancel: Some(CancelState {
                    signal: OnceSignal::new(),
                    cause: OnceLock::new(),
                }),
                deadline,
                value: None,
                parent: Some(self.clone()),
            }),
        };

        let guard = CancelGuard {
            ctx: child.clone(),
        };

        // Propagation needs an active party only when there is something to watch:
        // a cancellable ancestor or a timer. A child of the background context is
        // cancelled exclusively through its own guard.
        let parent_done = self.nearest_cancel().map(|cancel| cancel.signal.listen());
        if parent_done.is_some() || timer.is_some() {
            spawn_watcher(child.clone(), self.clone(), parent_done, timer);
        }

        (child, guard)
    }

    fn nearest_cancel(&self) -> Option<&CancelState> {
        let mut current = self;

        loop {
            if let Some(cancel) = &current.inner.cancel {
                return Some(cancel);
            }

            match &current.inner.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    fn cancel_with(&self, cause: CancelCause) {
        if let Some(cancel) = &self.inner.cancel
            && cancel.cause.set(cause).is_ok()
        {
            cancel.signal.fire();
        }
    }
}

/// One watcher thread per cancellable derivation: it parks until the child itself
/// is cancelled (nothing to do), an ancestor is cancelled (propagate the cause) or
/// the deadline passes.
fn spawn_watcher(child: Context, parent: Context, parent_done: Option<Signal>, timer: Option<Instant>) {
    let own_done = child.done();

    _ = thread::Builder::new()
        .name("context-watcher".to_owned())
        .spawn(move || {
            let parent_rx = parent_done
                .as_ref()
                .map_or_else(never, |signal| signal.receiver().clone());
            let timer_rx = timer.map_or_else(never, at);

            select! {
                recv(own_done.receiver()) -> _ => {}
                recv(parent_rx) -> _ => {
                    let cause = match parent.err() {
                        Some(Error::DeadlineExceeded) => CancelCause::DeadlineExceeded,
                        _ => CancelCause::Cancelled,
                    };
                    child.cancel_with(cause);
                }
                recv(timer_rx) -> _ => child.cancel_with(CancelCause::DeadlineExceeded),
            }
        })
        .expect("failed to spawn context watcher thread");
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.err().is_some())
            .field("deadline", &self.inner.deadline)
            .finish_non_exhaustive()
    }
}

/// Cancels its [`Context`] on request or on drop.
///
/// Holding the guard keeps the context live; dropping it cancels the context,
/// which releases the watcher thread of the derivation (and of any descendants).
#[derive(Debug)]
pub struct CancelGuard {
    ctx: Context,
}

impl CancelGuard {
    /// Cancels the guarded context. Idempotent.
    pub fn cancel(&self) {
        self.ctx.cancel_with(CancelCause::Cancelled);
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.ctx.cancel_with(CancelCause::Cancelled);
    }
}
