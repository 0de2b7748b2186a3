//! The resolved configuration of one task run.
//!
//! A `RunConfig` is the only thing that crosses the queue boundary. Its JSON
//! form is the queue payload: the unordered `repos` and `reviewers` sets are
//! written as sorted arrays, so the same config always serializes to the same
//! bytes and reads back to an equal value.

use crate::error::{PatchstormError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The coding-agent backend that runs inside the container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentProvider {
    /// OpenAI Codex CLI. Single prompt only.
    #[value(name = "codex")]
    Codex,
    /// Claude Code CLI. Multiple prompts run as one continued session.
    #[value(name = "claude_code")]
    ClaudeCode,
}

impl AgentProvider {
    /// Parse a provider from its wire name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "codex" => Some(Self::Codex),
            "claude_code" => Some(Self::ClaudeCode),
            _ => None,
        }
    }

    /// Wire name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::ClaudeCode => "claude_code",
        }
    }

    /// Whether the provider can continue a session across several prompts.
    pub fn supports_multiple_prompts(&self) -> bool {
        matches!(self, Self::ClaudeCode)
    }
}

impl fmt::Display for AgentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral switches of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// Report what would be submitted without submitting.
    pub dry: bool,
    /// Stop after detecting a diff; never commit, push, or open a PR.
    pub skip_pr: bool,
    /// Open pull requests as drafts.
    pub draft: bool,
}

/// Immutable description of a single run's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    commit_msg: String,
    prompts: Vec<String>,
    agent_provider: AgentProvider,
    repos: BTreeSet<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    reviewers: BTreeSet<String>,
    #[serde(default)]
    skip_pr: bool,
    #[serde(default)]
    dry: bool,
    #[serde(default)]
    draft: bool,
}

/// Older payloads carry `"reviewers": null` when no reviewers were set.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RunConfig {
    /// Build a config. Fails if `prompts` is empty.
    ///
    /// `repos` may be empty here; [`RunConfig::ensure_dispatchable`] rejects
    /// an empty set before anything is submitted.
    pub fn new(
        commit_msg: impl Into<String>,
        prompts: Vec<String>,
        agent_provider: AgentProvider,
        repos: BTreeSet<String>,
        reviewers: BTreeSet<String>,
        flags: RunFlags,
    ) -> Result<Self> {
        let config = Self {
            commit_msg: commit_msg.into(),
            prompts,
            agent_provider,
            repos,
            reviewers,
            skip_pr: flags.skip_pr,
            dry: flags.dry,
            draft: flags.draft,
        };
        config.check_prompts()?;
        Ok(config)
    }

    fn check_prompts(&self) -> Result<()> {
        if self.prompts.is_empty() {
            return Err(PatchstormError::Definition(
                "at least one prompt is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn commit_msg(&self) -> &str {
        &self.commit_msg
    }

    /// Prompts in session order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn agent_provider(&self) -> AgentProvider {
        self.agent_provider
    }

    pub fn repos(&self) -> &BTreeSet<String> {
        &self.repos
    }

    pub fn reviewers(&self) -> &BTreeSet<String> {
        &self.reviewers
    }

    pub fn is_dry(&self) -> bool {
        self.dry
    }

    pub fn skip_pr(&self) -> bool {
        self.skip_pr
    }

    pub fn is_draft(&self) -> bool {
        self.draft
    }

    /// Fail unless at least one repository is targeted.
    pub fn ensure_dispatchable(&self) -> Result<()> {
        if self.repos.is_empty() {
            return Err(PatchstormError::Definition(
                "no repository source resolved".to_string(),
            ));
        }
        Ok(())
    }

    /// A copy of this config targeting only `repo`.
    pub fn narrowed_to(&self, repo: &str) -> Self {
        Self {
            repos: BTreeSet::from([repo.to_string()]),
            ..self.clone()
        }
    }

    /// The single repository of a per-job config.
    pub fn single_repo(&self) -> Result<&str> {
        let mut iter = self.repos.iter();
        match (iter.next(), iter.next()) {
            (Some(repo), None) => Ok(repo),
            _ => Err(PatchstormError::Definition(format!(
                "a job config must target exactly one repository, found {}",
                self.repos.len()
            ))),
        }
    }

    /// Serialize to the queue payload form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            PatchstormError::Definition(format!("failed to serialize run config: {}", e))
        })
    }

    /// Deserialize a queue payload, re-checking the prompt invariant.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json).map_err(|e| {
            PatchstormError::Definition(format!("failed to parse run config payload: {}", e))
        })?;
        config.check_prompts()?;
        Ok(config)
    }
}
