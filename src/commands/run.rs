//! Implementation of the `patchstorm run` command.
//!
//! # Steps
//!
//! 1. Work out where the task comes from (file, direct prompt, or stdin)
//! 2. Collect command-line overrides
//! 3. Resolve the task into a run config (may hit code search)
//! 4. Dispatch: print the plan for a dry run, otherwise queue one job per
//!    repository

use crate::cli::RunArgs;
use crate::dispatcher::Dispatcher;
use crate::error::{PatchstormError, Result};
use crate::github::{CodeHost, GitHubClient};
use crate::queue::FsQueue;
use crate::resolver::{self, DirectPrompt, Overrides};
use crate::run_config::{AgentProvider, RunConfig};
use crate::settings::Settings;
use crate::task_definition::TaskDefinition;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;

/// Where the task description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskSource {
    File(PathBuf),
    Prompt(DirectPrompt),
    Stdin(String),
}

/// Execute the `patchstorm run` command.
pub fn cmd_run(settings: &Settings, args: RunArgs) -> Result<()> {
    settings.require_for_dispatch()?;
    let host = GitHubClient::new(settings)?;

    let config = build_config(&args, read_piped_stdin, &host)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if config.is_dry() {
        Dispatcher::planner(&host).dispatch(&config, &mut out)?;
        return Ok(());
    }

    let queue = FsQueue::open(settings.queue_path())?;
    let ledger = settings.events_path();
    let report = Dispatcher::new(&host, &queue)
        .with_ledger(&ledger)
        .dispatch(&config, &mut out)?;

    println!(
        "Submitted {} job(s) to {} ({} repository(ies) skipped).",
        report.submitted_count(),
        queue.root().display(),
        report.skipped.len()
    );
    Ok(())
}

/// Resolve the run config from arguments. `stdin` is only consulted when
/// neither a task file nor a prompt was given.
fn build_config<F>(args: &RunArgs, stdin: F, host: &dyn CodeHost) -> Result<RunConfig>
where
    F: FnOnce() -> Result<Option<String>>,
{
    let overrides = overrides_from(args)?;

    match task_source(args, stdin)? {
        TaskSource::File(path) => resolver::resolve(&TaskDefinition::load(path)?, &overrides, host),
        TaskSource::Stdin(yaml) => {
            resolver::resolve(&TaskDefinition::from_yaml(&yaml)?, &overrides, host)
        }
        TaskSource::Prompt(direct) => resolver::resolve_direct(&direct, &overrides, host),
    }
}

fn task_source<F>(args: &RunArgs, stdin: F) -> Result<TaskSource>
where
    F: FnOnce() -> Result<Option<String>>,
{
    if let Some(path) = &args.task_definition {
        reject_prompt_only_flags(args)?;
        return Ok(TaskSource::File(path.clone()));
    }

    if let Some(prompt) = &args.prompt {
        return Ok(TaskSource::Prompt(DirectPrompt {
            prompt: prompt.clone(),
            commit_msg: args.commit_msg.clone(),
            agent_provider: args.agent_provider.unwrap_or(AgentProvider::Codex),
        }));
    }

    match stdin()? {
        Some(yaml) if !yaml.trim().is_empty() => {
            reject_prompt_only_flags(args)?;
            Ok(TaskSource::Stdin(yaml))
        }
        _ => Err(PatchstormError::Usage(
            "You must provide a task definition file or a prompt.".to_string(),
        )),
    }
}

/// Provider and commit message of a task definition are part of the document.
fn reject_prompt_only_flags(args: &RunArgs) -> Result<()> {
    let flag = if args.agent_provider.is_some() {
        "--agent-provider"
    } else if args.commit_msg.is_some() {
        "--commit-msg"
    } else {
        return Ok(());
    };
    Err(PatchstormError::Usage(format!(
        "{} only applies to --prompt runs; set it in the task definition instead",
        flag
    )))
}

fn overrides_from(args: &RunArgs) -> Result<Overrides> {
    let repos = args
        .repos
        .as_deref()
        .map(resolver::parse_repo_list)
        .transpose()?;

    Ok(Overrides {
        repos,
        search_query: args
            .search_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string),
        dry: args.dry,
        skip_pr: args.skip_pr,
        draft: args.draft,
        reviewers: args.reviewers.as_deref().map(resolver::split_list),
    })
}

/// Read stdin when it is a pipe or file, not a terminal.
fn read_piped_stdin() -> Result<Option<String>> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut content = String::new();
    stdin
        .read_to_string(&mut content)
        .map_err(|e| PatchstormError::Usage(format!("failed to read standard input: {}", e)))?;
    Ok(Some(content))
}
