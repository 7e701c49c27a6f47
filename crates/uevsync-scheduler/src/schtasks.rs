//! `schtasks.exe` backend.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::types::SYSTEM_SID;
use crate::xml::{decode_output, encode_utf16, read_exec_action, render_task, rewrite_exec_action};
use crate::{RegisteredTask, SchedulerError, TaskAction, TaskDescriptor, TaskService};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Drives the host Task Scheduler through `schtasks.exe`.
#[derive(Debug, Clone)]
pub struct SchtasksService {
    program: PathBuf,
}

impl Default for SchtasksService {
    fn default() -> Self {
        Self::new("schtasks.exe")
    }
}

impl SchtasksService {
    /// Use a specific `schtasks` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, SchedulerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);
        Ok(cmd.output().await?)
    }

    /// Register `definition` under `full_name`, replacing any existing task.
    async fn register(
        &self,
        operation: &'static str,
        full_name: &str,
        definition: &str,
        run_as_system: bool,
    ) -> Result<(), SchedulerError> {
        let mut file = tempfile::Builder::new()
            .prefix("uevsync-task-")
            .suffix(".xml")
            .tempfile()?;
        file.write_all(&encode_utf16(definition))?;
        file.flush()?;

        let xml_path = path_arg(file.path())?;
        let mut args = vec!["/create", "/tn", full_name, "/xml", xml_path.as_str(), "/f"];
        if run_as_system {
            args.extend(["/ru", "SYSTEM"]);
        }

        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(command_error(operation, full_name, &output));
        }

        debug!(task = %full_name, operation, "registered task definition");
        Ok(())
    }
}

#[async_trait]
impl TaskService for SchtasksService {
    async fn query(&self, full_name: &str) -> Result<Option<RegisteredTask>, SchedulerError> {
        let output = self.run(&["/query", "/tn", full_name, "/xml"]).await?;

        if !output.status.success() {
            let stderr = decode_output(&output.stderr);
            if is_missing_task(&stderr) {
                debug!(task = %full_name, "task is not registered");
                return Ok(None);
            }
            return Err(command_error("query", full_name, &output));
        }

        let definition = decode_output(&output.stdout);
        let action = read_exec_action(&definition)?;
        if action.is_none() {
            warn!(task = %full_name, "registered task has no exec action");
        }

        Ok(Some(RegisteredTask {
            name: full_name.to_string(),
            action,
            definition,
        }))
    }

    async fn create(&self, descriptor: &TaskDescriptor) -> Result<(), SchedulerError> {
        let definition = render_task(descriptor)?;
        let run_as_system = descriptor.principal.user_id == SYSTEM_SID;
        self.register("create", &descriptor.full_name(), &definition, run_as_system)
            .await
    }

    async fn update_action(
        &self,
        task: &RegisteredTask,
        action: &TaskAction,
    ) -> Result<(), SchedulerError> {
        let definition = rewrite_exec_action(&task.definition, action)?;
        self.register("update", &task.name, &definition, false).await
    }
}

fn path_arg(path: &Path) -> Result<String, SchedulerError> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        SchedulerError::InvalidDefinition(format!(
            "temporary definition path is not valid UTF-8: {}",
            path.display()
        ))
    })
}

/// schtasks reports an unknown task name as a missing file.
fn is_missing_task(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("cannot find") || lower.contains("does not exist")
}

fn command_error(operation: &'static str, task: &str, output: &Output) -> SchedulerError {
    let stderr = decode_output(&output.stderr);
    let stdout = decode_output(&output.stdout);
    let message = match stderr.trim() {
        "" => stdout.trim().to_string(),
        err => err.to_string(),
    };
    SchedulerError::Command {
        operation,
        task: task.to_string(),
        message: format!("{} ({})", message, output.status),
    }
}
