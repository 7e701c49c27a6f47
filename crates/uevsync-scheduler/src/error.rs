//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Task definition XML could not be read.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Task definition could not be produced or decoded.
    #[error("invalid task definition: {0}")]
    InvalidDefinition(String),

    /// The task definition has no executable action to rewrite.
    #[error("task definition has no exec action")]
    MissingExecAction,

    /// schtasks.exe exited with a failure status.
    #[error("schtasks {operation} failed for {task}: {message}")]
    Command {
        operation: &'static str,
        task: String,
        message: String,
    },
}
