//! Reference executors shipped with the scheduler.
//!
//! Each reads typed fields from `task.payload` and simulates its side
//! effect with a short delay. They double as realistic fixtures for
//! integration tests and local development.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Task, TaskError};

use super::TaskExecutor;

fn required_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, TaskError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| TaskError::Permanent(format!("payload missing string field '{field}'")))
}

/// Sends an email described by `payload.to` and `payload.subject`.
pub struct EmailExecutor;

#[async_trait]
impl TaskExecutor for EmailExecutor {
    fn task_type(&self) -> &str {
        "email"
    }

    async fn execute(&self, task: &Task) -> Result<(), TaskError> {
        let to = required_str(&task.payload, "to")?;
        let subject = task
            .payload
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or_default();

        tracing::info!(task_id = %task.id, to, subject, "sending email");

        // Delivery latency scales with priority handling overhead.
        let millis = 100 + u64::try_from(task.priority.as_i32()).unwrap_or(0) * 50;
        tokio::time::sleep(Duration::from_millis(millis)).await;

        tracing::info!(task_id = %task.id, to, "email sent");
        Ok(())
    }
}

/// Pushes a notification carrying `payload.message`.
pub struct NotificationExecutor;

#[async_trait]
impl TaskExecutor for NotificationExecutor {
    fn task_type(&self) -> &str {
        "notification"
    }

    async fn execute(&self, task: &Task) -> Result<(), TaskError> {
        let message = required_str(&task.payload, "message")?;

        tracing::info!(task_id = %task.id, message, "sending notification");
        tokio::time::sleep(Duration::from_millis(50)).await;

        tracing::info!(task_id = %task.id, "notification sent");
        Ok(())
    }
}

/// Generates the report named by `payload.report_type`.
pub struct ReportExecutor;

#[async_trait]
impl TaskExecutor for ReportExecutor {
    fn task_type(&self) -> &str {
        "report"
    }

    async fn execute(&self, task: &Task) -> Result<(), TaskError> {
        let report_type = required_str(&task.payload, "report_type")?;

        tracing::info!(task_id = %task.id, report_type, "generating report");
        tokio::time::sleep(Duration::from_secs(1)).await;

        tracing::info!(task_id = %task.id, report_type, "report generated");
        Ok(())
    }
}

/// Runs a housekeeping job identified by the task name.
pub struct MaintenanceExecutor;

#[async_trait]
impl TaskExecutor for MaintenanceExecutor {
    fn task_type(&self) -> &str {
        "maintenance"
    }

    async fn execute(&self, task: &Task) -> Result<(), TaskError> {
        tracing::info!(task_id = %task.id, name = %task.name, "running maintenance");
        tokio::time::sleep(Duration::from_millis(200)).await;

        tracing::info!(task_id = %task.id, name = %task.name, "maintenance complete");
        Ok(())
    }
}
