//! Lease expiry returns abandoned tasks to surviving workers.

use std::time::Duration;

use taskmill::{ExecutorRegistry, SchedulerConfig, Store, TaskSpec, TaskStatus};

use crate::common::{fast_config, harness_with, wait_for_status};

#[tokio::test]
async fn expired_lease_is_retried_by_surviving_worker() {
    let config = SchedulerConfig {
        lease_ttl_s: 1,
        ..fast_config(2)
    };
    let mut h = harness_with(config, ExecutorRegistry::with_builtin());

    let task = h
        .scheduler
        .enqueue(
            TaskSpec::new("ping", "notification")
                .with_payload(serde_json::json!({"message": "hello"})),
        )
        .await
        .expect("enqueue");

    // A worker claims the task and then "crashes" without resolving it.
    let leased = h
        .scheduler
        .queue()
        .lease("worker-dead", 1)
        .await
        .expect("lease")
        .remove(0);
    assert_eq!(leased.task.id, task.id);

    h.pool.start();

    // While the lease is live nobody else can claim the task.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let held = h.scheduler.get(task.id).await.expect("get");
    assert_eq!(held.status, TaskStatus::Running);
    assert_eq!(held.worker_id.as_deref(), Some("worker-dead"));

    // Past the TTL the sweep reclaims the attempt. The pool's cleanup
    // timer runs on a minute cadence, so sweep explicitly here.
    tokio::time::sleep(Duration::from_millis(900)).await;
    let expired = h
        .store
        .expire_leases(chrono::Utc::now())
        .await
        .expect("expire leases");
    assert_eq!(expired, 1);

    let done = wait_for_status(
        &h.scheduler,
        task.id,
        TaskStatus::Completed,
        Duration::from_secs(2),
    )
    .await;

    assert_eq!(done.retries, 1, "the abandoned attempt counts as a failure");
    let survivor = done.worker_id.expect("completed by a pool worker");
    assert_ne!(survivor, "worker-dead");

    h.pool.stop().await;
}

#[tokio::test]
async fn late_ack_after_expiry_is_rejected() {
    let config = SchedulerConfig {
        lease_ttl_s: 1,
        ..fast_config(1)
    };
    let h = harness_with(config, ExecutorRegistry::with_builtin());

    let task = h
        .scheduler
        .enqueue(
            TaskSpec::new("ping", "notification")
                .with_payload(serde_json::json!({"message": "hello"})),
        )
        .await
        .expect("enqueue");

    let leased = h
        .scheduler
        .queue()
        .lease("worker-dead", 1)
        .await
        .expect("lease")
        .remove(0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.store
        .expire_leases(chrono::Utc::now())
        .await
        .expect("expire leases");

    // The zombie worker comes back after the sweeper resolved its attempt.
    let err = h
        .scheduler
        .queue()
        .ack(&leased, TaskStatus::Completed, None)
        .await
        .expect_err("stale lease must be rejected");
    assert!(err.to_string().contains("lease lost"));

    // Exactly one failure was recorded for the abandoned attempt.
    let current = h.scheduler.get(task.id).await.expect("get");
    assert_eq!(current.retries, 1);
    assert_eq!(current.status, TaskStatus::Pending);
}
