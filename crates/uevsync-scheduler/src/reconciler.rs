//! Keeps the managed task in its desired shape.

use tracing::{debug, info, warn};

use crate::{RegisteredTask, SchedulerError, TaskDescriptor, TaskService};

/// What the registered task looks like relative to the desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// No task with the configured name.
    Absent,
    /// The task's first action already matches.
    PresentMatching(RegisteredTask),
    /// The task's first action differs (or is missing).
    PresentDivergent(RegisteredTask),
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
}

impl TaskState {
    /// The outcome reconciling from this state produces.
    pub fn planned_outcome(&self) -> ReconcileOutcome {
        match self {
            TaskState::Absent => ReconcileOutcome::Created,
            TaskState::PresentMatching(_) => ReconcileOutcome::Unchanged,
            TaskState::PresentDivergent(_) => ReconcileOutcome::Updated,
        }
    }
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Created => write!(f, "created"),
            ReconcileOutcome::Updated => write!(f, "updated"),
            ReconcileOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Creates, updates or leaves alone one scheduled task.
pub struct Reconciler<S> {
    service: S,
}

impl<S: TaskService> Reconciler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// The underlying scheduler service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Look up the task once and classify it.
    ///
    /// A failed lookup is treated as an absent task.
    #[tracing::instrument(skip(self, desired), fields(task = %desired.full_name()))]
    pub async fn inspect(&self, desired: &TaskDescriptor) -> TaskState {
        let full_name = desired.full_name();
        let registered = match self.service.query(&full_name).await {
            Ok(registered) => registered,
            Err(e) => {
                warn!(error = %e, "task lookup failed, treating task as absent");
                None
            }
        };

        match registered {
            None => TaskState::Absent,
            Some(task) if task.action.as_ref() == Some(&desired.action) => {
                TaskState::PresentMatching(task)
            }
            Some(task) => TaskState::PresentDivergent(task),
        }
    }

    /// Bring the registered task in line with `desired`.
    #[tracing::instrument(skip(self, desired), fields(task = %desired.full_name()))]
    pub async fn reconcile(
        &self,
        desired: &TaskDescriptor,
    ) -> Result<ReconcileOutcome, SchedulerError> {
        match self.inspect(desired).await {
            TaskState::Absent => {
                self.service.create(desired).await?;
                info!(
                    executable = %desired.action.executable,
                    arguments = %desired.action.arguments,
                    "created scheduled task"
                );
                Ok(ReconcileOutcome::Created)
            }
            TaskState::PresentDivergent(task) => {
                debug!(current = ?task.action, "task action differs from desired");
                self.service.update_action(&task, &desired.action).await?;
                info!(
                    executable = %desired.action.executable,
                    arguments = %desired.action.arguments,
                    "updated scheduled task action"
                );
                Ok(ReconcileOutcome::Updated)
            }
            TaskState::PresentMatching(_) => {
                info!("scheduled task already up to date");
                Ok(ReconcileOutcome::Unchanged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskAction;

    fn registered(action: Option<TaskAction>) -> RegisteredTask {
        RegisteredTask {
            name: "\\Task".to_string(),
            action,
            definition: String::new(),
        }
    }

    #[test]
    fn test_planned_outcome() {
        assert_eq!(TaskState::Absent.planned_outcome(), ReconcileOutcome::Created);
        assert_eq!(
            TaskState::PresentMatching(registered(None)).planned_outcome(),
            ReconcileOutcome::Unchanged
        );
        assert_eq!(
            TaskState::PresentDivergent(registered(None)).planned_outcome(),
            ReconcileOutcome::Updated
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ReconcileOutcome::Created.to_string(), "created");
        assert_eq!(ReconcileOutcome::Updated.to_string(), "updated");
        assert_eq!(ReconcileOutcome::Unchanged.to_string(), "unchanged");
    }
}
