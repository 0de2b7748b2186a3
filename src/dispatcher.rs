//! Job dispatch.
//!
//! For each resolved repository, look for an open pull request whose title
//! equals the commit message; if there is none, submit one job carrying the
//! config narrowed to that repository. Dispatch never waits for jobs.
//!
//! Duplicate suppression happens here only. A job redelivered after a worker
//! crash, or two dispatchers racing on the same task, can still open
//! duplicate pull requests.

use crate::error::{PatchstormError, Result};
use crate::events::{self, Event, EventAction};
use crate::github::CodeHost;
use crate::queue::{JobEnvelope, JobQueue};
use crate::run_config::RunConfig;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Why a repository was left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An open pull request already carries the commit message as its title.
    DuplicatePullRequest { number: u64 },
    /// Open pull requests could not be listed.
    Unreachable(String),
}

/// What dispatch did (or, for a dry run, would have done).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Repositories that got (or would get) a job, in order.
    pub targets: Vec<String>,
    /// Submitted job ids, parallel to `targets`. Empty on a dry run.
    pub submitted: Vec<Uuid>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl DispatchReport {
    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }
}

/// Dispatches resolved configs onto a queue.
pub struct Dispatcher<'a> {
    host: &'a dyn CodeHost,
    queue: Option<&'a dyn JobQueue>,
    ledger: Option<&'a Path>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(host: &'a dyn CodeHost, queue: &'a dyn JobQueue) -> Self {
        Self {
            host,
            queue: Some(queue),
            ledger: None,
        }
    }

    /// A dispatcher for dry runs only. Submitting through it is an error.
    pub fn planner(host: &'a dyn CodeHost) -> Self {
        Self {
            host,
            queue: None,
            ledger: None,
        }
    }

    /// Record submissions and skips in the run ledger at `path`.
    pub fn with_ledger(mut self, path: &'a Path) -> Self {
        self.ledger = Some(path);
        self
    }

    fn record(&self, event: Event) {
        if let Some(path) = self.ledger {
            events::record(path, &event);
        }
    }

    /// Filter out repositories with a duplicate open pull request.
    ///
    /// A repository whose pull requests cannot be listed is excluded with a
    /// warning; the rest of the batch proceeds.
    fn filter(&self, config: &RunConfig) -> (Vec<String>, Vec<(String, SkipReason)>) {
        let mut targets = Vec::new();
        let mut skipped = Vec::new();

        for repo in config.repos() {
            match self.host.open_pull_requests(repo) {
                Ok(pulls) => {
                    match pulls.iter().find(|pr| pr.title == config.commit_msg()) {
                        Some(pr) => {
                            info!(repo = %repo, pr = pr.number, "skipping, a PR already exists");
                            skipped.push((
                                repo.clone(),
                                SkipReason::DuplicatePullRequest { number: pr.number },
                            ));
                        }
                        None => targets.push(repo.clone()),
                    }
                }
                Err(e) => {
                    warn!(repo = %repo, error = %e, "could not list open PRs, excluding repository");
                    skipped.push((repo.clone(), SkipReason::Unreachable(e.to_string())));
                }
            }
        }

        (targets, skipped)
    }

    /// Dispatch `config`. In dry-run mode the plan is written to `out` and
    /// nothing is submitted.
    pub fn dispatch(&self, config: &RunConfig, out: &mut dyn Write) -> Result<DispatchReport> {
        config.ensure_dispatchable()?;

        let (targets, skipped) = self.filter(config);
        let mut report = DispatchReport {
            targets,
            submitted: Vec::new(),
            skipped,
        };

        if config.is_dry() {
            write_plan(out, config, &report).map_err(|e| {
                PatchstormError::Usage(format!("failed to write dry-run plan: {}", e))
            })?;
            return Ok(report);
        }

        let queue = self.queue.ok_or_else(|| {
            PatchstormError::Queue("no job queue to submit to (dry-run dispatcher)".to_string())
        })?;

        for (repo, reason) in &report.skipped {
            let (kind, detail) = match reason {
                SkipReason::DuplicatePullRequest { number } => ("duplicate", json!(number)),
                SkipReason::Unreachable(error) => ("unreachable", json!(error)),
            };
            self.record(
                Event::new(EventAction::JobSkipped)
                    .with_repo(repo)
                    .with_details(json!({ "reason": kind, "detail": detail })),
            );
        }

        info!(repos = report.targets.len(), "submitting jobs");
        for repo in &report.targets {
            let envelope = JobEnvelope::for_config(&config.narrowed_to(repo))?;
            let id = queue.submit(&envelope)?;
            info!(repo = %repo, job = %id, "job submitted");
            self.record(
                Event::new(EventAction::JobSubmitted)
                    .with_repo(repo)
                    .with_details(json!({ "job": id.to_string() })),
            );
            report.submitted.push(id);
        }

        Ok(report)
    }
}

fn write_plan(out: &mut dyn Write, config: &RunConfig, report: &DispatchReport) -> std::io::Result<()> {
    writeln!(out, "would run with prompts: {:?}", config.prompts())?;
    writeln!(out, "commit message: {}", config.commit_msg())?;
    writeln!(out, "reviewers: {:?}", config.reviewers())?;
    writeln!(out, "agent provider: {}", config.agent_provider())?;
    writeln!(out, "skip PR: {}", config.skip_pr())?;
    writeln!(out, "draft: {}", config.is_draft())?;

    for (repo, reason) in &report.skipped {
        match reason {
            SkipReason::DuplicatePullRequest { .. } => {
                writeln!(out, "Skipping {} because a PR already exists.", repo)?;
            }
            SkipReason::Unreachable(_) => {
                writeln!(out, "Skipping {} because its PRs could not be listed.", repo)?;
            }
        }
    }

    writeln!(out, "running against {} repo(s):", report.targets.len())?;
    for repo in &report.targets {
        writeln!(out, "  {}", repo)?;
    }
    for repo in &report.targets {
        writeln!(out, "Would run on {}", repo)?;
    }
    Ok(())
}
