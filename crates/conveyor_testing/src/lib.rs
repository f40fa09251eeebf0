// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test aids shared by the conveyor test suites.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// If something (whatever) does not happen in a test within this time, the test will fail.
///
/// We are conservative here and allow much time - this is only to break out of infinite loops,
/// not for any situations that are actually expected. Several executor tests park real threads
/// on real channels, so a hung test would otherwise hang the whole suite.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes a thread-safe function on a background thread and abandons it if
/// it does not complete before [`TEST_TIMEOUT`].
///
/// There are two ways for the called function to fail: it does not finish in the allowed time,
/// or it panics and the result is never sent. In both cases the channel reports failure and the
/// caller receives `None`.
#[must_use]
pub fn execute_or_abandon<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (sender, receiver) = mpsc::channel();

    thread::spawn(move || {
        let result = f();
        _ = sender.send(result);
    });

    receiver.recv_timeout(TEST_TIMEOUT).ok()
}
