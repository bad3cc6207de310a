//! Tasks with no registered executor fail immediately, without retries.

use std::time::Duration;

use taskmill::{TaskSpec, TaskStatus};

use crate::common::{harness, wait_for_status};

#[tokio::test]
async fn unregistered_type_fails_without_retry() {
    let mut h = harness(1);
    h.pool.start();

    let task = h
        .scheduler
        .enqueue(TaskSpec::new("mystery", "nope"))
        .await
        .expect("enqueue");

    let failed = wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Failed,
        Duration::from_secs(2),
    )
    .await;

    assert_eq!(failed.retries, 0, "permanent failures consume no retries");
    assert!(
        failed.error.contains("no executor"),
        "unexpected error: {}",
        failed.error
    );
    assert!(failed.completed_at.is_some());

    h.pool.stop().await;
}

#[tokio::test]
async fn malformed_payload_fails_without_retry() {
    let mut h = harness(1);
    h.pool.start();

    // The email executor requires a string `to` field.
    let task = h
        .scheduler
        .enqueue(TaskSpec::new("broken", "email").with_payload(serde_json::json!({"to": 42})))
        .await
        .expect("enqueue");

    let failed = wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Failed,
        Duration::from_secs(2),
    )
    .await;

    assert_eq!(failed.retries, 0);
    assert!(failed.error.contains("payload missing"));

    h.pool.stop().await;
}
