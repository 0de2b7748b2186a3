//! Command implementations for patchstorm.
//!
//! This module routes CLI commands to their handlers. Settings are loaded
//! once here and passed down by reference.

mod queue;
mod run;
mod validate;
mod worker;

use crate::cli::{Cli, Command, QueueAction};
use crate::error::Result;
use crate::settings::Settings;

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Validate(args) => validate::cmd_validate(args),
        Command::Run(args) => {
            let settings = Settings::from_env(cli.config.as_deref())?;
            run::cmd_run(&settings, args)
        }
        Command::Worker(args) => {
            let settings = Settings::from_env(cli.config.as_deref())?;
            worker::cmd_worker(&settings, args)
        }
        Command::Queue(queue_cmd) => {
            let settings = Settings::from_env(cli.config.as_deref())?;
            match queue_cmd.action {
                QueueAction::Status => queue::cmd_queue_status(&settings),
                QueueAction::RequeueStale(args) => queue::cmd_requeue_stale(&settings, args),
            }
        }
    }
}
