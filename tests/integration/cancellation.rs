//! Cancellation semantics: only pending tasks are cancellable.

use std::time::Duration;

use taskmill::{QueueError, TaskSpec, TaskStatus};

use crate::common::{harness, wait_for_status};

#[tokio::test]
async fn pending_task_is_cancellable() {
    let mut h = harness(1);
    h.pool.start();

    let task = h
        .scheduler
        .enqueue(
            TaskSpec::new("someday", "maintenance")
                .with_scheduled_at(chrono::Utc::now() + chrono::Duration::hours(1)),
        )
        .await
        .expect("enqueue");

    let cancelled = h.scheduler.cancel(task.id).await.expect("cancel");
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    // Terminal: the pool never picks it up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.scheduler.get(task.id).await.expect("get").status,
        TaskStatus::Cancelled
    );

    h.pool.stop().await;
}

#[tokio::test]
async fn running_task_is_not_cancellable() {
    let mut h = harness(1);
    h.pool.start();

    // The report executor takes ~1s, leaving a window while it runs.
    let task = h
        .scheduler
        .enqueue(
            TaskSpec::new("slow", "report")
                .with_payload(serde_json::json!({"report_type": "annual"})),
        )
        .await
        .expect("enqueue");

    wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    let err = h.scheduler.cancel(task.id).await.expect_err("running task");
    assert!(matches!(
        err,
        QueueError::NotCancellable {
            status: TaskStatus::Running,
            ..
        }
    ));

    // The task still finishes normally.
    wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Completed,
        Duration::from_secs(3),
    )
    .await;

    h.pool.stop().await;
}

#[tokio::test]
async fn notifications_trace_the_lifecycle() {
    let mut h = harness(1);
    let mut rx = h.scheduler.subscribe();
    h.pool.start();

    let task = h
        .scheduler
        .enqueue(
            TaskSpec::new("ping", "notification")
                .with_payload(serde_json::json!({"message": "hi"})),
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
    h.pool.stop().await;

    let created = rx.recv().await.expect("created event");
    assert_eq!(created.task_id, task.id);
    assert_eq!(created.status, TaskStatus::Pending);
    assert!(created.ts > 0);

    let completed = rx.recv().await.expect("completed event");
    assert_eq!(completed.task_id, task.id);
    assert_eq!(completed.status, TaskStatus::Completed);
}
