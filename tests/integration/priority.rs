//! Dispatch order under mixed priorities.

use std::time::Duration;

use taskmill::{ExecutorRegistry, TaskPriority, TaskSpec, TaskStatus};

use crate::common::{fast_config, harness_with, wait_for_status, RecordingExecutor};

#[tokio::test]
async fn high_priority_task_jumps_the_queue() {
    let (executor, log) = RecordingExecutor::new("record");
    let mut executors = ExecutorRegistry::new();
    executors.register(std::sync::Arc::new(executor));
    let mut h = harness_with(fast_config(1), executors);

    // Fill the queue before any worker runs, low priorities first.
    let mut ids = Vec::new();
    for i in 0..10 {
        let task = h
            .scheduler
            .enqueue(
                TaskSpec::new(format!("low-{i}"), "record").with_priority(TaskPriority::Low),
            )
            .await
            .expect("enqueue low");
        ids.push(task.id);
    }
    let high = h
        .scheduler
        .enqueue(TaskSpec::new("high", "record").with_priority(TaskPriority::High))
        .await
        .expect("enqueue high");
    ids.push(high.id);

    h.pool.start();
    for id in &ids {
        wait_for_status(&h.scheduler, *id, TaskStatus::Completed, Duration::from_secs(5)).await;
    }
    h.pool.stop().await;

    let order = log.lock().expect("log lock");
    assert_eq!(order.len(), 11);
    assert_eq!(
        order[0], "high",
        "single worker must lease the high-priority task first: {order:?}"
    );
}

#[tokio::test]
async fn equal_priority_dispatches_by_schedule_time() {
    let (executor, log) = RecordingExecutor::new("record");
    let mut executors = ExecutorRegistry::new();
    executors.register(std::sync::Arc::new(executor));
    let mut h = harness_with(fast_config(1), executors);

    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        let task = h
            .scheduler
            .enqueue(TaskSpec::new(name, "record"))
            .await
            .expect("enqueue");
        ids.push(task.id);
        // Distinct scheduled_at stamps.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    h.pool.start();
    for id in &ids {
        wait_for_status(&h.scheduler, *id, TaskStatus::Completed, Duration::from_secs(5)).await;
    }
    h.pool.stop().await;

    let order = log.lock().expect("log lock");
    assert_eq!(*order, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn future_scheduled_task_waits_for_its_time() {
    let (executor, log) = RecordingExecutor::new("record");
    let mut executors = ExecutorRegistry::new();
    executors.register(std::sync::Arc::new(executor));
    let mut h = harness_with(fast_config(1), executors);
    h.pool.start();

    let delayed = h
        .scheduler
        .enqueue(
            TaskSpec::new("delayed", "record")
                .with_scheduled_at(chrono::Utc::now() + chrono::Duration::milliseconds(300)),
        )
        .await
        .expect("enqueue");

    // Strictly in the future: never leased early.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(log.lock().expect("log lock").is_empty());
    assert_eq!(
        h.scheduler.get(delayed.id).await.expect("get").status,
        TaskStatus::Pending
    );

    wait_for_status(
        &h.scheduler,
        delayed.id,
        TaskStatus::Completed,
        Duration::from_secs(2),
    )
    .await;
    h.pool.stop().await;
}
