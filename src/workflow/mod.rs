//! Per-repository execution workflow.
//!
//! A worker runs one job through this state machine:
//!
//! ```text
//! CLONED -> AGENT_INVOKED -> DIFF_CHECKED -> NO_CHANGE
//!                                         -> COMMITTED -> PUSHED -> PR_OPENED
//! ```
//!
//! With `skip_pr` the run stops at `DIFF_CHECKED` once a diff is found.
//!
//! # Steps
//!
//! 1. Reject quotes in prompts and the commit message (before anything else)
//! 2. Check the provider supports the prompt count
//! 3. Clone the repository into `{artifacts}/{repo}_{run_id}`
//! 4. Run the agent container against the clone
//! 5. Parse execution metadata from the agent output
//! 6. Stage everything and compare with `HEAD`
//! 7. Branch `bot/{run_id}`, commit, push, open the pull request
//!
//! Any failure aborts the job. Nothing is cleaned up: the work directory,
//! session script and output file stay under the artifacts root.

use crate::agent::{self, ExecutionMetadata};
use crate::error::{PatchstormError, Result};
use crate::events::{self, Event, EventAction};
use crate::git;
use crate::process::{CommandRunner, CommandSpec, run_checked};
use crate::resolver;
use crate::run_config::RunConfig;
use crate::settings::Settings;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;


/// States a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Cloned,
    AgentInvoked,
    DiffChecked,
    NoChange,
    Committed,
    Pushed,
    PrOpened,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Cloned => "CLONED",
            RunState::AgentInvoked => "AGENT_INVOKED",
            RunState::DiffChecked => "DIFF_CHECKED",
            RunState::NoChange => "NO_CHANGE",
            RunState::Committed => "COMMITTED",
            RunState::Pushed => "PUSHED",
            RunState::PrOpened => "PR_OPENED",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The agent left the tree unchanged.
    NoChange,
    /// A diff exists but `skip_pr` stopped the run before committing.
    ChangesDetected,
    /// A pull request was opened from `branch`.
    PullRequestOpened { branch: String, url: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::NoChange => write!(f, "no change"),
            RunOutcome::ChangesDetected => write!(f, "changes detected (PR skipped)"),
            RunOutcome::PullRequestOpened { url, .. } => write!(f, "pull request opened: {}", url),
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub repo: String,
    pub work_dir: PathBuf,
    pub outcome: RunOutcome,
    pub metadata: ExecutionMetadata,
    /// Every state entered, in order.
    pub states: Vec<RunState>,
}

/// Executes jobs against real or scripted subprocesses.
pub struct Workflow<'a> {
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
}

/// Fail if any prompt or the commit message contains a quote character.
pub fn reject_quotes(config: &RunConfig) -> Result<()> {
    for (i, prompt) in config.prompts().iter().enumerate() {
        if prompt.contains(['\'', '"']) {
            return Err(PatchstormError::UnsafeInput(format!(
                "prompt {} contains quotes, which are not supported; remove them",
                i + 1
            )));
        }
    }
    if config.commit_msg().contains(['\'', '"']) {
        return Err(PatchstormError::UnsafeInput(
            "commit message contains quotes, which are not supported; remove them".to_string(),
        ));
    }
    Ok(())
}

/// Branch name for a run.
pub fn branch_name(run_id: &str) -> String {
    format!("bot/{}", run_id)
}

impl<'a> Workflow<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn CommandRunner) -> Self {
        Self { settings, runner }
    }

    /// Run one job. `config` must target exactly one repository.
    ///
    /// Records `run_started` and then `run_completed` or `run_failed` in the
    /// run ledger.
    pub fn execute(&self, config: &RunConfig) -> Result<RunReport> {
        let repo = config.single_repo()?.to_string();
        let run_id = Uuid::new_v4().simple().to_string();

        let span = info_span!("run", run_id = %run_id, repo = %repo);
        let _enter = span.enter();

        let ledger = self.settings.events_path();
        events::record(
            &ledger,
            &Event::new(EventAction::RunStarted)
                .with_repo(&repo)
                .with_run(&run_id)
                .with_details(json!({
                    "agent": config.agent_provider().as_str(),
                    "prompts": config.prompts().len(),
                })),
        );
        info!("beginning run");

        match self.execute_run(config, &repo, &run_id) {
            Ok(report) => {
                info!(outcome = %report.outcome, "run completed");
                let pr_url = match &report.outcome {
                    RunOutcome::PullRequestOpened { url, .. } => Some(url.clone()),
                    _ => None,
                };
                events::record(
                    &ledger,
                    &Event::new(EventAction::RunCompleted)
                        .with_repo(&repo)
                        .with_run(&run_id)
                        .with_details(json!({
                            "outcome": report.outcome.to_string(),
                            "pr_url": pr_url,
                        })),
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "run failed");
                events::record(
                    &ledger,
                    &Event::new(EventAction::RunFailed)
                        .with_repo(&repo)
                        .with_run(&run_id)
                        .with_details(json!({ "error": e.to_string() })),
                );
                Err(e)
            }
        }
    }

    fn execute_run(&self, config: &RunConfig, repo: &str, run_id: &str) -> Result<RunReport> {
        // ====================================================================
        // Phase 1: Guards (no side effects)
        // ====================================================================

        resolver::validate_repo_id(repo)?;
        reject_quotes(config)?;
        agent::ensure_supported(config)?;
        let token = self.settings.token()?;
        let identity = if config.skip_pr() {
            None
        } else {
            Some(self.settings.identity()?)
        };

        let mut states = Vec::new();
        let mut enter = |state: RunState| {
            debug!(state = %state, "state transition");
            states.push(state);
        };

        // ====================================================================
        // Phase 2: Clone
        // ====================================================================

        let artifacts = &self.settings.artifacts_dir;
        let work_dir = artifacts.join(format!("{}_{}", repo, run_id));
        if let Some(parent) = work_dir.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PatchstormError::Usage(format!(
                    "failed to create '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let url = git::clone_url(&self.settings.git_host, token, repo);
        git::clone_repo(self.runner, &url, token, &work_dir)?;
        enter(RunState::Cloned);

        // ====================================================================
        // Phase 3: Agent
        // ====================================================================

        let output = agent::run(self.runner, self.settings, config, &work_dir, run_id)?;
        let output_path = artifacts.join(format!("{}_output.txt", run_id));
        crate::fs::atomic_write_file(&output_path, &output)?;
        enter(RunState::AgentInvoked);

        let metadata = ExecutionMetadata::from_output(config.agent_provider(), &output)?;

        // ====================================================================
        // Phase 4: Diff check
        // ====================================================================

        git::stage_all(self.runner, &work_dir)?;
        let changed = git::has_staged_changes(self.runner, &work_dir)?;
        enter(RunState::DiffChecked);

        let report = |outcome: RunOutcome, states: Vec<RunState>| RunReport {
            run_id: run_id.to_string(),
            repo: repo.to_string(),
            work_dir: work_dir.clone(),
            outcome,
            metadata: metadata.clone(),
            states,
        };

        if !changed {
            info!("no changes found");
            enter(RunState::NoChange);
            return Ok(report(RunOutcome::NoChange, states));
        }

        let Some(identity) = identity else {
            info!("changes found, skipping PR creation");
            return Ok(report(RunOutcome::ChangesDetected, states));
        };

        // ====================================================================
        // Phase 5: Commit, push, open pull request
        // ====================================================================

        let branch = branch_name(run_id);
        git::create_branch(self.runner, &work_dir, &branch)?;
        git::commit(self.runner, &work_dir, &identity, config.commit_msg())?;
        enter(RunState::Committed);

        git::push_branch(self.runner, &work_dir, &branch, token)?;
        enter(RunState::Pushed);

        let pr = self.pull_request_command(config, &branch, &metadata, token, &work_dir);
        let created = run_checked(self.runner, &pr)?;
        let url = created
            .output
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string();
        enter(RunState::PrOpened);
        info!(branch = %branch, url = %url, "pull request opened");

        Ok(report(RunOutcome::PullRequestOpened { branch, url }, states))
    }

    fn pull_request_command(
        &self,
        config: &RunConfig,
        branch: &str,
        metadata: &ExecutionMetadata,
        token: &str,
        work_dir: &std::path::Path,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new("gh")
            .args(["pr", "create", "--head", branch, "--title"])
            .arg(config.commit_msg())
            .arg("--body")
            .arg(metadata.pr_body());
        if config.is_draft() {
            spec = spec.arg("--draft");
        }
        if let Some(project) = &self.settings.github_project {
            spec = spec.arg("--project").arg(project.as_str());
        }
        if !config.reviewers().is_empty() {
            let reviewers: Vec<&str> = config.reviewers().iter().map(String::as_str).collect();
            spec = spec.arg("--reviewer").arg(reviewers.join(","));
        }
        spec.current_dir(work_dir)
            .secret_env("GH_TOKEN", token)
            .secret_env("GITHUB_TOKEN", token)
    }
}
