//! Enqueue one task and watch it complete.

use std::time::Duration;

use taskmill::{TaskPriority, TaskSpec, TaskStatus};

use crate::common::{harness, wait_for_status};

#[tokio::test]
async fn email_task_completes_within_a_second() {
    let mut h = harness(2);
    h.pool.start();

    let task = h
        .scheduler
        .enqueue(
            TaskSpec::new("send-mail", "email")
                .with_payload(serde_json::json!({"to": "a@b", "subject": "hi"}))
                .with_priority(TaskPriority::Medium),
        )
        .await
        .expect("enqueue");

    let done = wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Completed,
        Duration::from_secs(2),
    )
    .await;

    assert_eq!(done.retries, 0);
    assert!(done.error.is_empty());
    assert!(done.worker_id.is_some(), "completed task keeps its worker");
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert!(done.completed_at >= done.started_at);

    // Exactly one worker ran exactly one task.
    let workers = h.scheduler.worker_stats().await.expect("worker stats");
    let total: u64 = workers.iter().map(|w| w.tasks_run).sum();
    assert_eq!(total, 1);
    assert_eq!(workers.iter().filter(|w| w.tasks_run > 0).count(), 1);

    h.pool.stop().await;
}

#[tokio::test]
async fn stats_reflect_completed_work() {
    let mut h = harness(2);
    h.pool.start();

    let task = h
        .scheduler
        .enqueue(
            TaskSpec::new("ping", "notification")
                .with_payload(serde_json::json!({"message": "deployed"})),
        )
        .await
        .expect("enqueue");

    wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Completed,
        Duration::from_secs(2),
    )
    .await;

    let stats = h.scheduler.stats().await.expect("stats");
    assert_eq!(stats[&TaskStatus::Completed], 1);
    assert_eq!(stats[&TaskStatus::Pending], 0);
    assert_eq!(h.scheduler.queue_size().await.expect("queue size"), 0);

    h.pool.stop().await;
}
