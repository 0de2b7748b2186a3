//! Settings struct definition and defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub(crate) fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("/app/artifacts")
}
pub(crate) fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
pub(crate) fn default_git_host() -> String {
    "github.com".to_string()
}
pub(crate) fn default_claude_image() -> String {
    "claude_code".to_string()
}
pub(crate) fn default_codex_image() -> String {
    "codex".to_string()
}
pub(crate) fn default_search_page_delay_ms() -> u64 {
    200
}

/// Settings shared by the dispatcher and the workers.
///
/// Unknown fields in the YAML file are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // =========================================================================
    // Code hosting
    // =========================================================================
    /// Organization that code searches are scoped to.
    pub github_organization: Option<String>,

    /// Project board PRs are attached to, if any.
    pub github_project: Option<String>,

    /// API token. Never serialized back out.
    #[serde(skip_serializing)]
    pub github_token: Option<String>,

    /// File holding the API token (read and trimmed at load time).
    pub github_token_file: Option<PathBuf>,

    /// REST API base URL.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Host used for authenticated clone/push URLs.
    #[serde(default = "default_git_host")]
    pub git_host: String,

    /// Delay between code-search result pages, in milliseconds.
    #[serde(default = "default_search_page_delay_ms")]
    pub search_page_delay_ms: u64,

    // =========================================================================
    // Commit identity
    // =========================================================================
    /// Author name for agent commits.
    pub git_name: Option<String>,

    /// Author email for agent commits.
    pub git_email: Option<String>,

    // =========================================================================
    // Storage
    // =========================================================================
    /// Root for run working directories, scripts, outputs, and the event log.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Spool directory for the job queue (default: `{artifacts_dir}/queue`).
    pub queue_dir: Option<PathBuf>,

    // =========================================================================
    // Agent containers
    // =========================================================================
    /// Image that runs the `claude_code` provider.
    #[serde(default = "default_claude_image")]
    pub claude_image: String,

    /// Image that runs the `codex` provider.
    #[serde(default = "default_codex_image")]
    pub codex_image: String,

    /// Extra `--env-file` handed to agent containers.
    pub agent_env_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_organization: None,
            github_project: None,
            github_token: None,
            github_token_file: None,
            github_api_url: default_github_api_url(),
            git_host: default_git_host(),
            search_page_delay_ms: default_search_page_delay_ms(),
            git_name: None,
            git_email: None,
            artifacts_dir: default_artifacts_dir(),
            queue_dir: None,
            claude_image: default_claude_image(),
            codex_image: default_codex_image(),
            agent_env_file: None,
        }
    }
}

/// Author identity used for agent commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}
