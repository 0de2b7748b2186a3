//! Exit code constants for the patchstorm CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid task definition, unsafe input)
//! - 3: A subprocess (git, gh, docker) exited non-zero
//! - 4: Code-hosting service call failed
//! - 5: Job queue transport failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid or conflicting task definition, unsupported
/// configuration, or disallowed characters in user-controlled text.
pub const USER_ERROR: i32 = 1;

/// A subprocess exited with a non-zero status.
pub const COMMAND_FAILURE: i32 = 3;

/// A code-hosting API call failed (network error or non-success response).
pub const SERVICE_FAILURE: i32 = 4;

/// The job queue could not be read or written.
pub const QUEUE_FAILURE: i32 = 5;
