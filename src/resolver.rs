//! Task definition resolution.
//!
//! Turns a [`TaskDefinition`] (or a direct prompt) plus command-line
//! [`Overrides`] into a [`RunConfig`].
//!
//! # Repository precedence
//!
//! 1. Override repo list: used as-is, nothing else consulted
//! 2. Override search query: its results, nothing else consulted
//! 3. Otherwise `repos.include` unioned with the results of whichever of
//!    `repos.search_query` / top-level `search_query` is set (both is a
//!    conflict)
//!
//! An empty result is a definition error.

use crate::error::{PatchstormError, Result};
use crate::github::CodeHost;
use crate::run_config::{AgentProvider, RunConfig, RunFlags};
use crate::task_definition::TaskDefinition;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::info;

static REPO_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("Invalid repo id regex")
});

/// Values supplied out-of-band (on the command line). `None` means "not
/// given", which lets the task definition decide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub repos: Option<BTreeSet<String>>,
    pub search_query: Option<String>,
    pub dry: Option<bool>,
    pub skip_pr: Option<bool>,
    pub draft: Option<bool>,
    pub reviewers: Option<BTreeSet<String>>,
}

/// A single prompt given directly instead of a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPrompt {
    pub prompt: String,
    pub commit_msg: Option<String>,
    pub agent_provider: AgentProvider,
}

/// Check a repository identifier has the `owner/name` shape.
///
/// `.` and `..` are rejected as either part: identifiers become path
/// components of the run's work directory.
pub fn validate_repo_id(repo: &str) -> Result<()> {
    let dot_segment = repo.split('/').any(|part| part == "." || part == "..");
    if dot_segment || !REPO_ID_REGEX.is_match(repo) {
        return Err(PatchstormError::Definition(format!(
            "invalid repository '{}': expected owner/name",
            repo
        )));
    }
    Ok(())
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated repository list, validating every entry.
pub fn parse_repo_list(list: &str) -> Result<BTreeSet<String>> {
    let repos = split_list(list);
    for repo in &repos {
        validate_repo_id(repo)?;
    }
    Ok(repos)
}

/// Resolve a task definition into a run config.
pub fn resolve(
    task: &TaskDefinition,
    overrides: &Overrides,
    host: &dyn CodeHost,
) -> Result<RunConfig> {
    // Checked up front so a conflicting definition fails even when an
    // override would have short-circuited the search.
    let task_query = task.effective_search_query()?;

    let repos = match (&overrides.repos, &overrides.search_query) {
        (Some(repos), _) => repos.clone(),
        (None, Some(query)) => search(host, query)?,
        (None, None) => {
            let mut repos = task.included_repos();
            for repo in &repos {
                validate_repo_id(repo)?;
            }
            if let Some(query) = task_query {
                repos.extend(search(host, query)?);
            }
            repos
        }
    };

    let flags = RunFlags {
        dry: overrides.dry.or(task.dry).unwrap_or(false),
        skip_pr: overrides.skip_pr.or(task.skip_pr).unwrap_or(false),
        draft: overrides.draft.or(task.draft).unwrap_or(false),
    };
    let reviewers = overrides
        .reviewers
        .clone()
        .or_else(|| task.reviewers.clone())
        .unwrap_or_default();

    let config = RunConfig::new(
        task.commit_message.clone(),
        task.prompts.clone(),
        task.agent_provider,
        repos,
        reviewers,
        flags,
    )?;
    config.ensure_dispatchable()?;
    Ok(config)
}

/// Build a config from a direct prompt and command-line flags.
///
/// A commit message is required unless PR creation is skipped, and one of
/// the override repo list or search query must be present.
pub fn resolve_direct(
    direct: &DirectPrompt,
    overrides: &Overrides,
    host: &dyn CodeHost,
) -> Result<RunConfig> {
    let skip_pr = overrides.skip_pr.unwrap_or(false);
    let commit_msg = match &direct.commit_msg {
        Some(msg) if !msg.trim().is_empty() => msg.clone(),
        _ if skip_pr => String::new(),
        _ => {
            return Err(PatchstormError::Usage(
                "You must provide a commit message with --commit-msg".to_string(),
            ));
        }
    };

    let repos = match (&overrides.repos, &overrides.search_query) {
        (Some(repos), _) => repos.clone(),
        (None, Some(query)) => search(host, query)?,
        (None, None) => {
            return Err(PatchstormError::Usage(
                "You must specify either --repos or --search-query.".to_string(),
            ));
        }
    };

    let flags = RunFlags {
        dry: overrides.dry.unwrap_or(false),
        skip_pr,
        draft: overrides.draft.unwrap_or(false),
    };

    let config = RunConfig::new(
        commit_msg,
        vec![direct.prompt.clone()],
        direct.agent_provider,
        repos,
        overrides.reviewers.clone().unwrap_or_default(),
        flags,
    )?;
    config.ensure_dispatchable()?;
    Ok(config)
}

fn search(host: &dyn CodeHost, query: &str) -> Result<BTreeSet<String>> {
    let repos = host.search_repositories(query)?;
    info!(query, repos = repos.len(), "resolved search query");
    Ok(repos)
}
