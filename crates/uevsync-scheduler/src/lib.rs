//! Windows Task Scheduler reconciliation for uevsync.
//!
//! This crate keeps one scheduled task in the desired shape:
//! - Creates it when absent (daily trigger, SYSTEM principal, fixed settings)
//! - Rewrites its first action when the command line drifted
//! - Leaves it alone when the action already matches
//!
//! The OS is reached through the [`TaskService`] trait; [`SchtasksService`]
//! drives `schtasks.exe` with Task Scheduler XML definitions.

mod error;
mod reconciler;
mod schtasks;
mod service;
mod types;
pub mod xml;

pub use error::SchedulerError;
pub use reconciler::{ReconcileOutcome, Reconciler, TaskState};
pub use schtasks::SchtasksService;
pub use service::{RegisteredTask, TaskService};
pub use types::{
    Compatibility, DailyTrigger, RunLevel, TaskAction, TaskDescriptor, TaskPrincipal,
    TaskSettings,
};
