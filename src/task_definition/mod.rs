//! Task definition documents.
//!
//! A task definition is the YAML file (or stdin document) describing one
//! orchestration run:
//!
//! ```yaml
//! agent:
//!   provider: claude_code
//! commit:
//!   message: Pin third-party actions to a SHA
//! prompts:
//!   - prompt: Pin every third-party action in .github/workflows to a commit SHA
//!   - prompt: Add a comment with the original tag next to each pin
//! repos:
//!   include: [acme/api, acme/web]
//!   search_query: path:.github language:YAML tj-actions
//! reviewers: [octocat]
//! draft: true
//! ```
//!
//! The document is validated structurally first (see [`schema`]), then
//! decoded into a normalized [`TaskDefinition`].

mod schema;

#[cfg(test)]
mod tests;

pub use schema::validate_document;

use crate::error::{PatchstormError, Result};
use crate::run_config::AgentProvider;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Normalized `repos` selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSelection {
    /// Explicitly included repositories.
    pub include: BTreeSet<String>,
    /// Code-search query whose matching repositories are added.
    pub search_query: Option<String>,
}

/// A validated task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub agent_provider: AgentProvider,
    pub commit_message: String,
    pub prompts: Vec<String>,
    pub repos: Option<RepoSelection>,
    /// Top-level search query. Mutually exclusive with `repos.search_query`.
    pub search_query: Option<String>,
    pub draft: Option<bool>,
    pub dry: Option<bool>,
    pub skip_pr: Option<bool>,
    pub reviewers: Option<BTreeSet<String>>,
}

#[derive(Deserialize)]
struct RawTaskDefinition {
    agent: RawAgent,
    commit: RawCommit,
    prompts: Vec<RawPrompt>,
    #[serde(default)]
    repos: Option<RawRepos>,
    #[serde(default)]
    search_query: Option<String>,
    #[serde(default)]
    draft: Option<bool>,
    #[serde(default)]
    dry: Option<bool>,
    #[serde(default)]
    skip_pr: Option<bool>,
    #[serde(default)]
    reviewers: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawAgent {
    provider: AgentProvider,
}

#[derive(Deserialize)]
struct RawCommit {
    message: String,
}

#[derive(Deserialize)]
struct RawPrompt {
    prompt: String,
}

/// `repos` object. The legacy bare-list form is rejected by the schema check.
#[derive(Deserialize)]
struct RawRepos {
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    search_query: Option<String>,
}

impl TaskDefinition {
    /// Load and validate a task definition file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PatchstormError::Usage(format!(
                "failed to read task definition '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a task definition document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| {
            PatchstormError::Definition(format!("failed to parse task definition YAML: {}", e))
        })?;
        validate_document(&doc)?;

        let raw: RawTaskDefinition = serde_yaml::from_value(doc).map_err(|e| {
            PatchstormError::Definition(format!("failed to decode task definition: {}", e))
        })?;

        let repos = raw.repos.map(|r| RepoSelection {
            include: r.include.into_iter().collect(),
            search_query: r.search_query,
        });

        Ok(Self {
            agent_provider: raw.agent.provider,
            commit_message: raw.commit.message,
            prompts: raw.prompts.into_iter().map(|p| p.prompt).collect(),
            repos,
            search_query: raw.search_query,
            draft: raw.draft,
            dry: raw.dry,
            skip_pr: raw.skip_pr,
            reviewers: raw.reviewers.map(|r| r.into_iter().collect()),
        })
    }

    /// The repository-selection search query, whichever field holds it.
    ///
    /// Fails with a conflict when both `repos.search_query` and the top-level
    /// `search_query` are present.
    pub fn effective_search_query(&self) -> Result<Option<&str>> {
        let nested = self.repos.as_ref().and_then(|r| r.search_query.as_deref());
        match (nested, self.search_query.as_deref()) {
            (Some(_), Some(_)) => Err(PatchstormError::Conflict(
                "cannot specify both 'repos.search_query' and top-level 'search_query' in the task definition"
                    .to_string(),
            )),
            (nested, top) => Ok(nested.or(top)),
        }
    }

    /// Repositories listed under `repos.include`.
    pub fn included_repos(&self) -> BTreeSet<String> {
        self.repos
            .as_ref()
            .map(|r| r.include.clone())
            .unwrap_or_default()
    }
}
