//! Executor dispatch by task type.
//!
//! Executors implement the work behind a task type. The registry is built
//! once at startup and read-only afterwards; workers resolve executors by
//! `task.task_type` and nack tasks whose type has no registration.

mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Task, TaskError};

pub use builtin::{EmailExecutor, MaintenanceExecutor, NotificationExecutor, ReportExecutor};

/// Trait for task executors.
///
/// Implementations read their typed input from `task.payload` and perform
/// whatever side effects the task type implies. Returning
/// [`TaskError::Retryable`] re-enters the retry policy; returning
/// [`TaskError::Permanent`] fails the task immediately.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// The task type this executor handles.
    fn task_type(&self) -> &str;

    /// Executes the task.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] when the work fails; the variant decides
    /// whether the attempt is retried.
    async fn execute(&self, task: &Task) -> Result<(), TaskError>;
}

impl std::fmt::Debug for dyn TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskExecutor({})", self.task_type())
    }
}

/// Registry mapping task type to executor.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the four reference executors registered:
    /// `email`, `notification`, `report` and `maintenance`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailExecutor));
        registry.register(Arc::new(NotificationExecutor));
        registry.register(Arc::new(ReportExecutor));
        registry.register(Arc::new(MaintenanceExecutor));
        registry
    }

    /// Registers an executor, replacing any previous registration for the
    /// same task type. Call during startup only; workers receive the
    /// registry behind an `Arc` and never mutate it.
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors
            .insert(executor.task_type().to_string(), executor);
    }

    /// Resolves the executor for a task type.
    #[must_use]
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(task_type).cloned()
    }

    /// Returns true if an executor is registered for the task type.
    #[must_use]
    pub fn contains(&self, task_type: &str) -> bool {
        self.executors.contains_key(task_type)
    }

    /// Number of registered executors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Returns true if no executors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let task_types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        f.debug_struct("ExecutorRegistry")
            .field("executors", &task_types)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct NoopExecutor {
        task_type: String,
    }

    #[async_trait]
    impl TaskExecutor for NoopExecutor {
        fn task_type(&self) -> &str {
            &self.task_type
        }

        async fn execute(&self, _task: &Task) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ExecutorRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("email").is_none());
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(NoopExecutor {
            task_type: "noop".into(),
        }));

        assert!(registry.contains("noop"));
        assert!(registry.get("noop").is_some());
        assert!(!registry.contains("other"));
    }

    #[test]
    fn test_register_replaces_same_type() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(NoopExecutor {
            task_type: "noop".into(),
        }));
        registry.register(Arc::new(NoopExecutor {
            task_type: "noop".into(),
        }));

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_builtin_registrations() {
        let registry = ExecutorRegistry::with_builtin();
        assert_eq!(registry.len(), 4);
        for task_type in ["email", "notification", "report", "maintenance"] {
            assert!(registry.contains(task_type), "missing {task_type}");
        }
    }

    #[tokio::test]
    async fn test_resolved_executor_runs() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(NoopExecutor {
            task_type: "noop".into(),
        }));

        let task = Task::new("t", "noop", Value::Null);
        let executor = registry.get("noop").unwrap();
        assert!(executor.execute(&task).await.is_ok());
    }
}
