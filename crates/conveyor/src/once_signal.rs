// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::convert::Infallible;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

use crate::ERR_POISONED_LOCK;

/// A one-shot broadcast event: fired at most once, observable by any number of
/// listeners, each of which is released exactly when (or immediately after) the
/// event fires.
///
/// The event is represented as the disconnection of a zero-capacity channel.
/// Nothing is ever sent through the channel; firing drops the only sender, which
/// wakes every blocked receiver and makes the event immediately observable to
/// listeners that subscribe later. This gives us many-listener broadcast, timed
/// waits and `select!` composition from a single primitive.
///
/// # Thread safety
///
/// The source and all of its [`Signal`] subscriptions may be used from any thread.
#[derive(Debug)]
pub(crate) struct OnceSignal {
    tx: Mutex<Option<Sender<Infallible>>>,
    rx: Receiver<Infallible>,
}

impl OnceSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(0);

        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Fires the signal, releasing every current and future listener.
    ///
    /// Safe to call multiple times; only the first call has any effect.
    pub(crate) fn fire(&self) {
        drop(self.tx.lock().expect(ERR_POISONED_LOCK).take());
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.tx.lock().expect(ERR_POISONED_LOCK).is_none()
    }

    /// Creates a new subscription to this signal.
    pub(crate) fn listen(&self) -> Signal {
        Signal {
            rx: self.rx.clone(),
        }
    }
}

/// A subscription to a one-shot event (an execution completing, an executor
/// draining, a context being cancelled).
///
/// Cloning is cheap and every clone observes the same event. For composition in
/// caller select sets, [`receiver()`][Self::receiver] exposes the underlying
/// channel: the event has fired once receive operations report disconnection.
#[derive(Debug, Clone)]
pub struct Signal {
    rx: Receiver<Infallible>,
}

impl Signal {
    /// Blocks until the event fires. Returns immediately if it already has.
    pub fn wait(&self) {
        match self.rx.recv() {
            Err(_) => {}
            Ok(never) => match never {},
        }
    }

    /// Blocks until the event fires or the timeout elapses.
    /// Returns whether the event fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Ok(never) => match never {},
        }
    }

    /// Blocks until the event fires or the deadline passes.
    /// Returns whether the event fired.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        match self.rx.recv_deadline(deadline) {
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Ok(never) => match never {},
        }
    }

    /// Whether the event has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// The underlying channel, for use in `crossbeam_channel::select!` sets.
    /// A receive operation completes (with a disconnection error) exactly when
    /// the event has fired.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<Infallible> {
        &self.rx
    }
}
