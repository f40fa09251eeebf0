// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Graceful shutdown: drain everything accepted, reject everything new, signal
//! completion exactly once.

use std::thread;
use std::time::Duration;

use conveyor::{Config, Context, Error, Executor, ExecutorStatus};
use conveyor_testing::TEST_TIMEOUT;

#[test]
fn shutdown_drains_in_flight_work() {
    let executor = Executor::new(
        "drain",
        Config {
            concurrency: 1,
            queue_size: 0,
            eager_initialization: true,
            block_on_full_queue: true,
        },
    );

    let ctx = Context::background();
    let first = executor.submit(
        &ctx,
        |_| {
            thread::sleep(Duration::from_millis(100));
            Ok(1_u32)
        },
        [],
    );
    let second = executor.submit(
        &ctx,
        |_| {
            thread::sleep(Duration::from_millis(100));
            Ok(2_u32)
        },
        [],
    );

    executor.shutdown();
    assert_eq!(executor.status(), ExecutorStatus::Terminating);

    let done = executor.done();
    assert!(done.wait_timeout(TEST_TIMEOUT));

    // Everything accepted before shutdown ran to completion.
    assert!(matches!(first.get(), Some(Ok(1))));
    assert!(matches!(second.get(), Some(Ok(2))));

    assert_eq!(executor.status(), ExecutorStatus::Terminated);
    assert_eq!(executor.worker_count(), 0);
}

#[test]
fn submit_after_shutdown_is_rejected() {
    let executor = Executor::new(
        "reject-after-stop",
        Config {
            concurrency: 1,
            queue_size: 4,
            eager_initialization: true,
            block_on_full_queue: false,
        },
    );

    executor.shutdown();

    let execution = executor.submit(&Context::background(), |_| Ok(true), []);

    assert!(execution.status().is_rejected());
    assert!(execution.done().is_fired());
    assert!(matches!(execution.get(), Some(Err(Error::Rejected))));
}

#[test]
fn shutdown_is_idempotent() {
    let executor = Executor::new(
        "idempotent-stop",
        Config {
            concurrency: 2,
            queue_size: 4,
            eager_initialization: true,
            block_on_full_queue: false,
        },
    );

    executor.shutdown().shutdown();
    assert!(executor.done().wait_timeout(TEST_TIMEOUT));

    let after = executor.status();
    executor.shutdown();

    assert_eq!(executor.status(), after);
    assert_eq!(executor.status(), ExecutorStatus::Terminated);
}

#[test]
fn done_observers_subscribed_before_and_after_all_release() {
    let executor = Executor::new(
        "done-observers",
        Config {
            concurrency: 1,
            queue_size: 4,
            eager_initialization: true,
            block_on_full_queue: false,
        },
    );

    let early = executor.done();
    executor.shutdown();
    assert!(early.wait_timeout(TEST_TIMEOUT));

    let late = executor.done();
    assert!(late.is_fired());
    late.wait();
}

#[test]
fn shutdown_without_workers_terminates_promptly() {
    let executor = Executor::new(
        "no-workers",
        Config {
            concurrency: 4,
            queue_size: 16,
            eager_initialization: false,
            block_on_full_queue: false,
        },
    );

    executor.shutdown();

    assert!(executor.done().wait_timeout(TEST_TIMEOUT));
    assert_eq!(executor.status(), ExecutorStatus::Terminated);
    assert_eq!(executor.worker_count(), 0);
}

#[test]
fn shutdown_drains_a_deep_queue() {
    let executor = Executor::new(
        "deep-drain",
        Config {
            concurrency: 2,
            queue_size: 32,
            eager_initialization: true,
            block_on_full_queue: true,
        },
    );

    let ctx = Context::background();
    let executions: Vec<_> = (0..24_usize)
        .map(|index| {
            executor.submit(
                &ctx,
                move |_| {
                    thread::sleep(Duration::from_millis(5));
                    Ok(index)
                },
                [],
            )
        })
        .collect();

    executor.shutdown();
    assert!(executor.done().wait_timeout(TEST_TIMEOUT));

    for (index, execution) in executions.iter().enumerate() {
        assert!(matches!(execution.get(), Some(Ok(i)) if *i == index));
    }
}
