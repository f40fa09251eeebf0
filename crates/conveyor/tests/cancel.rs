// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cancellation and timed waits against a live executor.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use conveyor::{Args, Config, Context, Error, Executor, TaskOption};
use conveyor_testing::TEST_TIMEOUT;

fn single_worker(name: &str) -> Executor {
    Executor::new(
        name,
        Config {
            concurrency: 1,
            queue_size: 8,
            eager_initialization: true,
            block_on_full_queue: true,
        },
    )
}

#[test]
fn cancel_of_queued_execution_wins() {
    let executor = single_worker("cancel-queued");
    let ctx = Context::background();

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let blocker = executor.submit(
        &ctx,
        move |_| {
            _ = release_rx.recv_timeout(TEST_TIMEOUT);
            Ok(())
        },
        [],
    );

    // Queued behind the blocker; nothing has started it yet.
    let victim = executor.submit(&ctx, |_| Ok(1_u32), []);

    assert!(victim.cancel());
    assert!(!victim.cancel());

    assert!(victim.status().is_cancelled());
    assert!(victim.done().is_fired());
    assert!(matches!(victim.get(), Some(Err(Error::Cancelled))));

    release_tx.send(()).unwrap();
    assert!(blocker.wait_with_timeout(TEST_TIMEOUT).is_ok());

    // The worker eventually ran the cancelled submission's body; whatever it
    // produced was discarded.
    assert!(matches!(victim.get(), Some(Err(Error::Cancelled))));
    assert!(victim.status().is_cancelled());
}

#[test]
fn running_task_observes_handle_cancellation() {
    let executor = single_worker("cancel-running");

    let (observed_tx, observed_rx) = mpsc::channel();
    let execution = executor.submit(
        &Context::background(),
        move |task_ctx| {
            task_ctx.done().wait();
            _ = observed_tx.send(task_ctx.err());
            Ok(5_u32)
        },
        [],
    );

    // Give the worker a moment to pick the task up, then cancel while it runs.
    thread::sleep(Duration::from_millis(50));
    assert!(execution.cancel());

    let observed = observed_rx.recv_timeout(TEST_TIMEOUT).unwrap();
    assert!(matches!(observed, Some(Error::Cancelled)));

    assert!(execution.status().is_cancelled());
    assert!(matches!(execution.get(), Some(Err(Error::Cancelled))));
}

#[test]
fn caller_context_cancellation_reaches_the_task_without_flipping_the_handle() {
    let executor = single_worker("ctx-cancel");

    let (ctx, guard) = Context::background().with_cancel();
    let execution = executor.submit(
        &ctx,
        |task_ctx| {
            task_ctx.done().wait();
            Ok("observed")
        },
        [],
    );

    thread::sleep(Duration::from_millis(50));
    guard.cancel();

    // The task returned on its own; the handle completed normally.
    assert!(execution.wait_with_timeout(TEST_TIMEOUT).is_ok());
    assert!(execution.status().is_done());
    assert!(matches!(execution.get(), Some(Ok("observed"))));
}

#[test]
fn timed_wait_expires_without_affecting_the_task() {
    let executor = single_worker("timed-wait");

    let execution = executor.submit(
        &Context::background(),
        |_| {
            thread::sleep(Duration::from_millis(100));
            Ok(true)
        },
        [],
    );

    assert!(matches!(
        execution.wait_with_timeout(Duration::from_millis(25)),
        Err(Error::Timeout)
    ));

    execution.wait();
    assert!(matches!(execution.get(), Some(Ok(true))));
}

#[test]
fn wait_with_context_reports_the_callers_cancellation() {
    let executor = single_worker("wait-ctx");

    let execution = executor.submit(
        &Context::background(),
        |_| {
            thread::sleep(Duration::from_millis(100));
            Ok(true)
        },
        [],
    );

    let (waiter_ctx, guard) = Context::background().with_cancel();
    guard.cancel();

    assert!(matches!(
        execution.wait_with_context(&waiter_ctx),
        Err(Error::Cancelled)
    ));

    // The failed wait left the execution alone.
    execution.wait();
    assert!(matches!(execution.get(), Some(Ok(true))));
}

#[test]
fn deadline_context_cancels_the_task_cooperatively() {
    let executor = single_worker("deadline-ctx");

    let (ctx, _guard) = Context::background().with_timeout(Duration::from_millis(30));
    let execution = executor.submit(
        &ctx,
        |task_ctx| {
            if task_ctx.done().wait_timeout(TEST_TIMEOUT) {
                return Err("gave up".into());
            }
            Ok(())
        },
        [],
    );

    assert!(execution.wait_with_timeout(TEST_TIMEOUT).is_ok());

    match execution.get() {
        Some(Err(Error::Task(error))) => assert_eq!(error.to_string(), "gave up"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn args_travel_to_the_task() {
    let executor = single_worker("args");

    let execution = executor.submit(
        &Context::background(),
        |task_ctx| {
            let base = *task_ctx.args().get::<u64>(0).ok_or("missing arg 0")?;
            let label = task_ctx
                .args()
                .get::<&str>(1)
                .copied()
                .ok_or("missing arg 1")?;
            Ok(format!("{label}:{base}"))
        },
        [TaskOption::Args(Args::new().with(41_u64).with("answer"))],
    );

    assert!(execution.wait_with_timeout(TEST_TIMEOUT).is_ok());

    match execution.get() {
        Some(Ok(rendered)) => assert_eq!(rendered, "answer:41"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
