//! CLI argument parsing for patchstorm.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::run_config::AgentProvider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Patchstorm: fan an AI coding-agent task out across many repositories.
///
/// A task (prompts + commit message) is resolved into a set of target
/// repositories, one job per repository is queued, and workers run the
/// agent in a container and open a pull request for any change.
#[derive(Parser, Debug)]
#[command(name = "patchstorm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (YAML). Defaults to $PATCHSTORM_CONFIG when set.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for patchstorm.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a task and queue one job per target repository.
    ///
    /// The task comes from --task-definition, from --prompt, or as a task
    /// definition on standard input.
    Run(RunArgs),

    /// Check a task definition file against the schema.
    Validate(ValidateArgs),

    /// Claim and execute queued jobs.
    Worker(WorkerArgs),

    /// Inspect or repair the job queue.
    Queue(QueueCommand),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Path to a YAML task definition.
    #[arg(short, long, value_name = "FILE")]
    pub task_definition: Option<PathBuf>,

    /// A single prompt to run instead of a task definition.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Commit message (and PR title) for a --prompt run.
    #[arg(long)]
    pub commit_msg: Option<String>,

    /// Comma-separated repositories (owner/name). Overrides the task definition.
    #[arg(long)]
    pub repos: Option<String>,

    /// Code-search query selecting repositories. Overrides the task definition.
    #[arg(long)]
    pub search_query: Option<String>,

    /// Print the plan without queueing anything.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub dry: Option<bool>,

    /// Stop after detecting changes; never commit, push, or open a PR.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub skip_pr: Option<bool>,

    /// Open pull requests as drafts.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub draft: Option<bool>,

    /// Agent for a --prompt run (default: codex).
    #[arg(long, value_enum)]
    pub agent_provider: Option<AgentProvider>,

    /// Comma-separated GitHub usernames to request review from.
    #[arg(long)]
    pub reviewers: Option<String>,
}

/// Arguments for the `validate` command.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Task definition file to check.
    pub file: PathBuf,
}

/// Arguments for the `worker` command.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Process at most one job, then exit.
    #[arg(long)]
    pub once: bool,

    /// Seconds to wait when the queue is empty.
    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,
}

/// Queue subcommands.
#[derive(Parser, Debug)]
pub struct QueueCommand {
    #[command(subcommand)]
    pub action: QueueAction,
}

/// Available queue actions.
#[derive(Subcommand, Debug)]
pub enum QueueAction {
    /// Show job counts per state.
    Status,

    /// Return jobs claimed longer ago than the threshold to pending.
    ///
    /// Use after a worker crash. A job that is still running will be
    /// executed a second time.
    RequeueStale(RequeueStaleArgs),
}

/// Arguments for the `queue requeue-stale` command.
#[derive(Parser, Debug)]
pub struct RequeueStaleArgs {
    /// Minimum claim age, in minutes.
    #[arg(long, default_value_t = 60)]
    pub older_than_mins: i64,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_with_task_definition() {
        let cli = Cli::try_parse_from([
            "patchstorm",
            "run",
            "--task-definition",
            "task.yaml",
            "--repos",
            "acme/a,acme/b",
            "--dry",
        ])
        .unwrap();

        if let Command::Run(args) = cli.command {
            assert_eq!(args.task_definition, Some(PathBuf::from("task.yaml")));
            assert_eq!(args.repos.as_deref(), Some("acme/a,acme/b"));
            assert_eq!(args.dry, Some(true));
            assert_eq!(args.skip_pr, None);
            assert_eq!(args.draft, None);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_explicit_false_flag() {
        let cli = Cli::try_parse_from(["patchstorm", "run", "-t", "t.yaml", "--draft=false"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.draft, Some(false));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_direct_prompt() {
        let cli = Cli::try_parse_from([
            "patchstorm",
            "run",
            "--prompt",
            "fix the typo",
            "--commit-msg",
            "Fix typo",
            "--agent-provider",
            "claude_code",
            "--reviewers",
            "alice,bob",
        ])
        .unwrap();

        if let Command::Run(args) = cli.command {
            assert_eq!(args.prompt.as_deref(), Some("fix the typo"));
            assert_eq!(args.agent_provider, Some(AgentProvider::ClaudeCode));
            assert_eq!(args.reviewers.as_deref(), Some("alice,bob"));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_worker_and_globals() {
        let cli = Cli::try_parse_from([
            "patchstorm",
            "worker",
            "--once",
            "--config",
            "/etc/patchstorm.yaml",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/patchstorm.yaml")));
        if let Command::Worker(args) = cli.command {
            assert!(args.once);
            assert_eq!(args.poll_interval_secs, 5);
        } else {
            panic!("Expected Worker command");
        }
    }

    #[test]
    fn parse_queue_requeue_stale() {
        let cli = Cli::try_parse_from([
            "patchstorm",
            "queue",
            "requeue-stale",
            "--older-than-mins",
            "15",
        ])
        .unwrap();

        match cli.command {
            Command::Queue(QueueCommand {
                action: QueueAction::RequeueStale(args),
            }) => assert_eq!(args.older_than_mins, 15),
            other => panic!("Expected queue requeue-stale, got {:?}", other),
        }
    }

    #[test]
    fn parse_unknown_provider_fails() {
        assert!(
            Cli::try_parse_from(["patchstorm", "run", "--prompt", "p", "--agent-provider", "gpt"])
                .is_err()
        );
    }
}
