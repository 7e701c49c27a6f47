//! The seam between the reconciler and the host task scheduler.

use async_trait::async_trait;

use crate::{SchedulerError, TaskAction, TaskDescriptor};

/// A task as currently registered with the host scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTask {
    /// Full task path, folder included.
    pub name: String,
    /// The first executable action, if the task has one.
    pub action: Option<TaskAction>,
    /// The task's complete XML definition.
    pub definition: String,
}

/// Operations the reconciler needs from a task scheduler.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Look up a task by its full path. `Ok(None)` means it does not exist.
    async fn query(&self, full_name: &str) -> Result<Option<RegisteredTask>, SchedulerError>;

    /// Register a new task.
    async fn create(&self, descriptor: &TaskDescriptor) -> Result<(), SchedulerError>;

    /// Replace the first action of an existing task, keeping its trigger,
    /// settings and principal.
    async fn update_action(
        &self,
        task: &RegisteredTask,
        action: &TaskAction,
    ) -> Result<(), SchedulerError>;
}
