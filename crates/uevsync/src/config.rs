//! Run configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use clap::Args;

use uevsync_scheduler::{
    DailyTrigger, TaskAction, TaskDescriptor, TaskPrincipal, TaskSettings,
};

/// Script downloaded from the container unless overridden.
pub const DEFAULT_SCRIPT_NAME: &str = "Set-Uev.ps1";

/// Scheduled task name unless overridden.
pub const DEFAULT_TASK_NAME: &str = "Download and Register UE-V Templates";

pub const DEFAULT_EXECUTABLE: &str = r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe";

pub const DEFAULT_BASE_ARGUMENTS: &str =
    "-NoProfile -NonInteractive -ExecutionPolicy Bypass -WindowStyle Hidden";

pub const DEFAULT_TARGET_DIR: &str = r"C:\ProgramData\UEV\Scripts";

/// Parse a trigger time given as `HH:MM` or `HH:MM:SS`.
pub fn parse_trigger_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| format!("invalid time '{}', expected HH:MM or HH:MM:SS", s))
}

/// Command-line options for a deployment run.
#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Container listing URL (e.g. https://<account>.blob.core.windows.net/<container>?restype=container&comp=list)
    #[arg(long, env = "UEVSYNC_LISTING_URL")]
    pub listing_url: String,

    /// Name of the script blob to download
    #[arg(long, env = "UEVSYNC_SCRIPT_NAME", default_value = DEFAULT_SCRIPT_NAME)]
    pub script_name: String,

    /// Directory the script is downloaded into (created if missing)
    #[arg(long, env = "UEVSYNC_TARGET_DIR", default_value = DEFAULT_TARGET_DIR)]
    pub target_dir: PathBuf,

    /// Scheduled task name
    #[arg(long, env = "UEVSYNC_TASK_NAME", default_value = DEFAULT_TASK_NAME)]
    pub task_name: String,

    /// Task Scheduler folder the task is registered under
    #[arg(long, env = "UEVSYNC_TASK_FOLDER", default_value = "\\")]
    pub task_folder: String,

    /// Executable the task runs
    #[arg(long, env = "UEVSYNC_EXECUTABLE", default_value = DEFAULT_EXECUTABLE)]
    pub executable: String,

    /// Arguments passed before `-File <script>`
    #[arg(long, env = "UEVSYNC_BASE_ARGUMENTS", default_value = DEFAULT_BASE_ARGUMENTS, allow_hyphen_values = true)]
    pub base_arguments: String,

    /// Local time of the daily run (HH:MM)
    #[arg(long, env = "UEVSYNC_TRIGGER_TIME", value_parser = parse_trigger_time, default_value = "09:00")]
    pub trigger_time: NaiveTime,

    /// Per-request HTTP timeout in seconds (platform default when unset)
    #[arg(long, env = "UEVSYNC_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: Option<u64>,

    /// Report what would change without touching the task scheduler
    #[arg(long)]
    pub dry_run: bool,
}

/// Everything a deployment run needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub listing_url: String,
    pub script_name: String,
    pub target_dir: PathBuf,
    pub task_name: String,
    pub task_folder: String,
    pub executable: String,
    pub base_arguments: String,
    pub trigger_time: NaiveTime,
    pub http_timeout: Option<Duration>,
    pub dry_run: bool,
}

impl From<DeployArgs> for RunConfig {
    fn from(args: DeployArgs) -> Self {
        Self {
            listing_url: args.listing_url,
            script_name: args.script_name,
            target_dir: args.target_dir,
            task_name: args.task_name,
            task_folder: args.task_folder,
            executable: args.executable,
            base_arguments: args.base_arguments,
            trigger_time: args.trigger_time,
            http_timeout: args.http_timeout_secs.map(Duration::from_secs),
            dry_run: args.dry_run,
        }
    }
}

impl RunConfig {
    /// Desired task for a script downloaded to `script_path`.
    pub fn task_descriptor(&self, script_path: &Path) -> TaskDescriptor {
        TaskDescriptor {
            name: self.task_name.clone(),
            folder: self.task_folder.clone(),
            action: TaskAction::for_script(&self.executable, &self.base_arguments, script_path),
            trigger: DailyTrigger::starting_today(self.trigger_time),
            settings: TaskSettings::default(),
            principal: TaskPrincipal::system(),
        }
    }
}
