//! Retry with backoff, and permanent failure after budget exhaustion.

use std::time::Duration;

use taskmill::{ExecutorRegistry, TaskSpec, TaskStatus};

use crate::common::{
    fast_config, harness_with, wait_for_status, AlwaysFailExecutor, FlakyExecutor,
};

#[tokio::test]
async fn flaky_task_completes_after_two_retries() {
    let mut executors = ExecutorRegistry::new();
    executors.register(std::sync::Arc::new(FlakyExecutor::new("flaky", 2)));
    let mut h = harness_with(fast_config(1), executors);
    h.pool.start();

    let task = h
        .scheduler
        .enqueue(TaskSpec::new("wobbly", "flaky").with_max_retries(3))
        .await
        .expect("enqueue");

    let done = wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(done.retries, 2);
    // Success clears the error from the failed attempts.
    assert!(done.error.is_empty());
    assert!(done.completed_at.is_some());

    h.pool.stop().await;
}

#[tokio::test]
async fn failing_task_exhausts_budget_and_fails() {
    let mut executors = ExecutorRegistry::new();
    executors.register(std::sync::Arc::new(AlwaysFailExecutor::new("doomed")));
    let mut h = harness_with(fast_config(1), executors);
    h.pool.start();

    let task = h
        .scheduler
        .enqueue(TaskSpec::new("hopeless", "doomed").with_max_retries(3))
        .await
        .expect("enqueue");

    let failed = wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Failed,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(failed.retries, 3);
    assert!(failed.completed_at.is_some());
    // The last attempt's message is recorded verbatim.
    assert_eq!(failed.error, "attempt 3 failed");
    assert!(failed.worker_id.is_some());

    h.pool.stop().await;
}

#[tokio::test]
async fn backoff_spaces_out_attempts() {
    let mut executors = ExecutorRegistry::new();
    executors.register(std::sync::Arc::new(FlakyExecutor::new("flaky", 2)));
    let mut h = harness_with(fast_config(1), executors);
    h.pool.start();

    let started = std::time::Instant::now();
    let task = h
        .scheduler
        .enqueue(TaskSpec::new("wobbly", "flaky").with_max_retries(3))
        .await
        .expect("enqueue");

    wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    // Two backoffs at 20ms base: 1^2*20ms + 2^2*20ms = 100ms minimum.
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "retries completed faster than the backoff allows: {:?}",
        started.elapsed()
    );

    h.pool.stop().await;
}
