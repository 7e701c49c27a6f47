//! Scheduled task types.

use std::path::Path;

use chrono::{Local, NaiveDate, NaiveTime};

/// Well-known SID of the local SYSTEM account.
pub const SYSTEM_SID: &str = "S-1-5-18";

/// Desired state of the managed scheduled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Task name, without folder.
    pub name: String,
    /// Task Scheduler folder, e.g. `\` or `\UE-V\`.
    pub folder: String,
    /// What the task runs.
    pub action: TaskAction,
    /// When the task runs.
    pub trigger: DailyTrigger,
    /// Run conditions.
    pub settings: TaskSettings,
    /// Account the task runs as.
    pub principal: TaskPrincipal,
}

/// An executable and its argument string.
///
/// Only these two fields are compared against a registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAction {
    pub executable: String,
    pub arguments: String,
}

/// Runs once a day at a local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    pub start_date: NaiveDate,
    pub at: NaiveTime,
}

/// Run conditions for the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSettings {
    pub allow_start_on_batteries: bool,
    pub stop_if_going_on_batteries: bool,
    pub hidden: bool,
    pub run_only_if_network_available: bool,
    pub compatibility: Compatibility,
}

/// Task Scheduler compatibility level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compatibility {
    /// Tasks compatible with Windows Server 2003 / XP era schedulers.
    #[default]
    V1,
}

/// Account and privilege level the task runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPrincipal {
    pub user_id: String,
    pub run_level: RunLevel,
}

/// Privilege level of the task's principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunLevel {
    #[default]
    Highest,
}

impl TaskDescriptor {
    /// Task path as understood by `schtasks /tn`.
    pub fn full_name(&self) -> String {
        format!("{}{}", normalize_folder(&self.folder), self.name)
    }
}

impl TaskAction {
    /// Command line that runs `script` with `executable`.
    ///
    /// The script path is appended to `base_arguments` as a quoted `-File`
    /// parameter.
    pub fn for_script(executable: &str, base_arguments: &str, script: &Path) -> Self {
        let file_arg = format!("-File \"{}\"", script.display());
        let arguments = match base_arguments.trim() {
            "" => file_arg,
            base => format!("{base} {file_arg}"),
        };
        Self {
            executable: executable.to_string(),
            arguments,
        }
    }
}

impl DailyTrigger {
    /// Daily trigger whose first run is today at `at`.
    pub fn starting_today(at: NaiveTime) -> Self {
        Self {
            start_date: Local::now().date_naive(),
            at,
        }
    }

    /// `StartBoundary` value: local time without offset.
    pub fn start_boundary(&self) -> String {
        self.start_date
            .and_time(self.at)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            allow_start_on_batteries: true,
            stop_if_going_on_batteries: false,
            hidden: true,
            run_only_if_network_available: true,
            compatibility: Compatibility::V1,
        }
    }
}

impl Compatibility {
    /// Schema version written to the task definition's `version` attribute.
    pub fn schema_version(&self) -> &'static str {
        match self {
            Compatibility::V1 => "1.1",
        }
    }
}

impl TaskPrincipal {
    /// The local SYSTEM account at the highest privilege level.
    pub fn system() -> Self {
        Self {
            user_id: SYSTEM_SID.to_string(),
            run_level: RunLevel::Highest,
        }
    }
}

impl RunLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunLevel::Highest => "HighestAvailable",
        }
    }
}

/// Folder with exactly one leading and one trailing backslash.
pub(crate) fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim().trim_matches('\\');
    if trimmed.is_empty() {
        "\\".to_string()
    } else {
        format!("\\{trimmed}\\")
    }
}
