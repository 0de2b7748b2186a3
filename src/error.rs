//! Error types for patchstorm.
//!
//! Uses thiserror for derive macros. Resolution-time variants (`Definition`,
//! `Conflict`) abort before anything is submitted; per-job variants abort only
//! the job that raised them.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for patchstorm operations.
#[derive(Error, Debug)]
pub enum PatchstormError {
    /// Malformed or incomplete task description.
    #[error("invalid task definition: {0}")]
    Definition(String),

    /// Mutually exclusive options were both supplied.
    #[error("conflicting options: {0}")]
    Conflict(String),

    /// A valid but unimplemented combination of options.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Disallowed characters in user-controlled text.
    #[error("unsafe input: {0}")]
    UnsafeInput(String),

    /// Bad arguments, unreadable files, or incomplete settings.
    #[error("{0}")]
    Usage(String),

    /// A subprocess exited non-zero (or could not be started).
    #[error("command `{command}` failed (exit code {}): {output}", display_status(.status))]
    CommandFailure {
        /// Redacted command line.
        command: String,
        /// Exit status, `None` if the process never ran or was killed.
        status: Option<i32>,
        /// Combined stdout and stderr.
        output: String,
    },

    /// The agent finished but its trailing metadata line could not be parsed.
    #[error("malformed agent output: {0}")]
    AgentOutput(String),

    /// A code-hosting API call failed. Left to queue redelivery.
    #[error("code-hosting service error: {0}")]
    TransientService(String),

    /// The job queue could not be read or written.
    #[error("queue error: {0}")]
    Queue(String),
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl PatchstormError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            PatchstormError::Definition(_)
            | PatchstormError::Conflict(_)
            | PatchstormError::UnsupportedConfiguration(_)
            | PatchstormError::UnsafeInput(_)
            | PatchstormError::Usage(_) => exit_codes::USER_ERROR,
            PatchstormError::CommandFailure { .. } | PatchstormError::AgentOutput(_) => {
                exit_codes::COMMAND_FAILURE
            }
            PatchstormError::TransientService(_) => exit_codes::SERVICE_FAILURE,
            PatchstormError::Queue(_) => exit_codes::QUEUE_FAILURE,
        }
    }
}

/// Result type alias for patchstorm operations.
pub type Result<T> = std::result::Result<T, PatchstormError>;
