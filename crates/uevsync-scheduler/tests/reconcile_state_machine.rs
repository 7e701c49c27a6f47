//! Reconciler transitions against an in-memory task scheduler.
//!
//! The fake keeps each task as its XML definition and edits it with the same
//! rendering and rewrite functions the schtasks backend uses, so the tests
//! observe exactly what would be handed to the OS:
//!
//! - Absent -> one task created with the configured trigger/settings/principal
//! - Present and divergent -> only the action is rewritten
//! - Present and matching -> no mutation at all

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use pretty_assertions::assert_eq;

use uevsync_scheduler::xml::{read_exec_action, render_task, rewrite_exec_action};
use uevsync_scheduler::{
    DailyTrigger, ReconcileOutcome, Reconciler, RegisteredTask, SchedulerError, TaskAction,
    TaskDescriptor, TaskPrincipal, TaskService, TaskSettings, TaskState,
};

const TASK_NAME: &str = "Download and Register UE-V Templates";

#[derive(Default)]
struct InMemoryScheduler {
    tasks: Mutex<HashMap<String, String>>,
    creates: Mutex<u32>,
    updates: Mutex<u32>,
    fail_queries: bool,
}

impl InMemoryScheduler {
    fn with_task(full_name: &str, definition: String) -> Self {
        let scheduler = Self::default();
        scheduler
            .tasks
            .lock()
            .unwrap()
            .insert(full_name.to_string(), definition);
        scheduler
    }

    fn definition(&self, full_name: &str) -> Option<String> {
        self.tasks.lock().unwrap().get(full_name).cloned()
    }

    fn creates(&self) -> u32 {
        *self.creates.lock().unwrap()
    }

    fn updates(&self) -> u32 {
        *self.updates.lock().unwrap()
    }
}

#[async_trait]
impl TaskService for InMemoryScheduler {
    async fn query(&self, full_name: &str) -> Result<Option<RegisteredTask>, SchedulerError> {
        if self.fail_queries {
            return Err(SchedulerError::Command {
                operation: "query",
                task: full_name.to_string(),
                message: "RPC server unavailable".to_string(),
            });
        }
        match self.definition(full_name) {
            Some(definition) => Ok(Some(RegisteredTask {
                name: full_name.to_string(),
                action: read_exec_action(&definition)?,
                definition,
            })),
            None => Ok(None),
        }
    }

    async fn create(&self, descriptor: &TaskDescriptor) -> Result<(), SchedulerError> {
        let definition = render_task(descriptor)?;
        self.tasks
            .lock()
            .unwrap()
            .insert(descriptor.full_name(), definition);
        *self.creates.lock().unwrap() += 1;
        Ok(())
    }

    async fn update_action(
        &self,
        task: &RegisteredTask,
        action: &TaskAction,
    ) -> Result<(), SchedulerError> {
        let definition = rewrite_exec_action(&task.definition, action)?;
        self.tasks.lock().unwrap().insert(task.name.clone(), definition);
        *self.updates.lock().unwrap() += 1;
        Ok(())
    }
}

fn desired(arguments: &str) -> TaskDescriptor {
    TaskDescriptor {
        name: TASK_NAME.to_string(),
        folder: "\\".to_string(),
        action: TaskAction {
            executable: r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe".to_string(),
            arguments: arguments.to_string(),
        },
        trigger: DailyTrigger {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        },
        settings: TaskSettings::default(),
        principal: TaskPrincipal::system(),
    }
}

/// The part of a definition that precedes its actions.
fn non_action_part(definition: &str) -> &str {
    let end = definition.find("<Actions").unwrap();
    &definition[..end]
}

#[tokio::test]
async fn absent_task_is_created_once() {
    let desired = desired(r#"-ExecutionPolicy Bypass -File "C:\UEV\Set-Uev.ps1""#);
    let reconciler = Reconciler::new(InMemoryScheduler::default());

    let outcome = reconciler.reconcile(&desired).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);

    let scheduler = reconciler.service();
    assert_eq!(scheduler.creates(), 1);
    assert_eq!(scheduler.updates(), 0);
    assert_eq!(scheduler.tasks.lock().unwrap().len(), 1);

    let definition = scheduler.definition(&format!("\\{TASK_NAME}")).unwrap();
    assert!(definition.contains("<StartBoundary>2024-01-02T09:00:00</StartBoundary>"));
    assert!(definition.contains("<UserId>S-1-5-18</UserId>"));
    assert!(definition.contains("<RunLevel>HighestAvailable</RunLevel>"));
    assert!(definition.contains("<Hidden>true</Hidden>"));
    assert!(definition.contains("<RunOnlyIfNetworkAvailable>true</RunOnlyIfNetworkAvailable>"));
    assert_eq!(read_exec_action(&definition).unwrap(), Some(desired.action));
}

#[tokio::test]
async fn divergent_task_gets_action_rewritten_only() {
    let full_name = format!("\\{TASK_NAME}");
    let mut old = desired(r#"-File "C:\Old\Set-Uev.ps1""#);
    // The registered task was created on another day at another hour
    old.trigger = DailyTrigger {
        start_date: NaiveDate::from_ymd_opt(2019, 7, 1).unwrap(),
        at: NaiveTime::from_hms_opt(3, 30, 0).unwrap(),
    };
    let original = render_task(&old).unwrap();

    let desired = desired(r#"-ExecutionPolicy Bypass -File "C:\UEV\Set-Uev.ps1""#);
    let reconciler = Reconciler::new(InMemoryScheduler::with_task(&full_name, original.clone()));

    let outcome = reconciler.reconcile(&desired).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated);

    let scheduler = reconciler.service();
    assert_eq!(scheduler.creates(), 0);
    assert_eq!(scheduler.updates(), 1);

    let updated = scheduler.definition(&full_name).unwrap();
    assert_eq!(read_exec_action(&updated).unwrap(), Some(desired.action));
    assert_eq!(non_action_part(&updated), non_action_part(&original));
    assert!(updated.contains("<StartBoundary>2019-07-01T03:30:00</StartBoundary>"));
}

#[tokio::test]
async fn divergent_executable_is_rewritten() {
    let full_name = format!("\\{TASK_NAME}");
    let mut old = desired("-File run.ps1");
    old.action.executable = "pwsh.exe".to_string();

    let desired = desired("-File run.ps1");
    let reconciler = Reconciler::new(InMemoryScheduler::with_task(
        &full_name,
        render_task(&old).unwrap(),
    ));

    assert_eq!(
        reconciler.reconcile(&desired).await.unwrap(),
        ReconcileOutcome::Updated
    );
    let updated = reconciler.service().definition(&full_name).unwrap();
    assert_eq!(read_exec_action(&updated).unwrap(), Some(desired.action));
}

#[tokio::test]
async fn matching_task_is_left_alone() {
    let full_name = format!("\\{TASK_NAME}");
    let desired = desired(r#"-File "C:\UEV\Set-Uev.ps1""#);
    let original = render_task(&desired).unwrap();
    let reconciler = Reconciler::new(InMemoryScheduler::with_task(&full_name, original.clone()));

    let outcome = reconciler.reconcile(&desired).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);

    let scheduler = reconciler.service();
    assert_eq!(scheduler.creates(), 0);
    assert_eq!(scheduler.updates(), 0);
    assert_eq!(scheduler.definition(&full_name).unwrap(), original);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let desired = desired(r#"-File "C:\UEV\Set-Uev.ps1""#);
    let reconciler = Reconciler::new(InMemoryScheduler::default());

    assert_eq!(
        reconciler.reconcile(&desired).await.unwrap(),
        ReconcileOutcome::Created
    );
    assert_eq!(
        reconciler.reconcile(&desired).await.unwrap(),
        ReconcileOutcome::Unchanged
    );
    assert_eq!(reconciler.service().creates(), 1);
    assert_eq!(reconciler.service().updates(), 0);
}

#[tokio::test]
async fn failed_lookup_is_treated_as_absent() {
    let scheduler = InMemoryScheduler {
        fail_queries: true,
        ..Default::default()
    };
    let reconciler = Reconciler::new(scheduler);
    let desired = desired("-File run.ps1");

    assert_eq!(reconciler.inspect(&desired).await, TaskState::Absent);
    assert_eq!(
        reconciler.reconcile(&desired).await.unwrap(),
        ReconcileOutcome::Created
    );
    assert_eq!(reconciler.service().creates(), 1);
}

#[tokio::test]
async fn task_without_exec_action_cannot_be_updated() {
    let full_name = format!("\\{TASK_NAME}");
    let definition = r#"<Task><Actions Context="Author"><ComHandler><ClassId>{0}</ClassId></ComHandler></Actions></Task>"#;
    let reconciler = Reconciler::new(InMemoryScheduler::with_task(
        &full_name,
        definition.to_string(),
    ));
    let desired = desired("-File run.ps1");

    assert!(matches!(
        reconciler.inspect(&desired).await,
        TaskState::PresentDivergent(_)
    ));
    assert!(matches!(
        reconciler.reconcile(&desired).await,
        Err(SchedulerError::MissingExecAction)
    ));
}
