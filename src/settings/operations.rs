//! Settings loading, environment overlay, and validation.

use super::model::{GitIdentity, Settings};
use crate::error::{PatchstormError, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming an optional YAML settings file.
pub const CONFIG_PATH_VAR: &str = "PATCHSTORM_CONFIG";

impl Settings {
    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            PatchstormError::Usage(format!(
                "failed to read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml).map_err(|e| {
            PatchstormError::Usage(format!("failed to parse settings YAML: {}", e))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Build the process settings: defaults, then the optional YAML file
    /// (`config_path` or `$PATCHSTORM_CONFIG`), then the process environment.
    pub fn from_env(config_path: Option<&Path>) -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();

        let file = config_path
            .map(Path::to_path_buf)
            .or_else(|| lookup(CONFIG_PATH_VAR).map(PathBuf::from));

        let mut settings = match file {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_env(lookup)?;
        Ok(settings)
    }

    /// Overlay values from an environment lookup.
    ///
    /// `TEST_MODE=1|true` swaps in a fixed `test` identity, token and
    /// organization with `/tmp/artifacts` as the artifacts root.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if get("TEST_MODE").is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true")) {
            let test = Some("test".to_string());
            self.github_organization = test.clone();
            self.github_project = test.clone();
            self.git_name = test.clone();
            self.git_email = test.clone();
            self.github_token = test;
            self.artifacts_dir = PathBuf::from("/tmp/artifacts");
            return self.validate();
        }

        if let Some(v) = get("GITHUB_ORGANIZATION") {
            self.github_organization = Some(v);
        }
        if let Some(v) = get("GITHUB_PROJECT") {
            self.github_project = Some(v);
        }
        if let Some(v) = get("GIT_NAME") {
            self.git_name = Some(v);
        }
        if let Some(v) = get("GIT_EMAIL") {
            self.git_email = Some(v);
        }
        if let Some(v) = get("ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(v);
        }
        if let Some(v) = get("PATCHSTORM_QUEUE_DIR") {
            self.queue_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PATCHSTORM_AGENT_ENV_FILE") {
            self.agent_env_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("GITHUB_TOKEN_FILE") {
            self.github_token_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.github_token = Some(v.trim().to_string());
        }

        if self.github_token.is_none()
            && let Some(path) = &self.github_token_file
        {
            self.github_token = Some(read_token_file(path)?);
        }

        self.validate()
    }

    /// Validate field values.
    ///
    /// Rules:
    /// - `github_api_url` must be an http(s) URL
    /// - `git_host` and both container images must be non-empty
    pub fn validate(&self) -> Result<()> {
        if !(self.github_api_url.starts_with("https://")
            || self.github_api_url.starts_with("http://"))
        {
            return Err(PatchstormError::Usage(format!(
                "settings validation failed: github_api_url must be an http(s) URL (found '{}')",
                self.github_api_url
            )));
        }
        if self.git_host.trim().is_empty() {
            return Err(PatchstormError::Usage(
                "settings validation failed: git_host must not be empty".to_string(),
            ));
        }
        if self.claude_image.trim().is_empty() || self.codex_image.trim().is_empty() {
            return Err(PatchstormError::Usage(
                "settings validation failed: agent container images must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The code-hosting API token.
    pub fn token(&self) -> Result<&str> {
        self.github_token.as_deref().ok_or_else(|| {
            PatchstormError::Usage(
                "no code-hosting token configured. Set GITHUB_TOKEN_FILE or GITHUB_TOKEN."
                    .to_string(),
            )
        })
    }

    /// The organization code searches are scoped to.
    pub fn organization(&self) -> Result<&str> {
        self.github_organization.as_deref().ok_or_else(|| {
            PatchstormError::Usage("no organization configured. Set GITHUB_ORGANIZATION.".to_string())
        })
    }

    /// The commit author identity.
    pub fn identity(&self) -> Result<GitIdentity> {
        match (&self.git_name, &self.git_email) {
            (Some(name), Some(email)) => Ok(GitIdentity {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => Err(PatchstormError::Usage(
                "no commit identity configured. Set GIT_NAME and GIT_EMAIL.".to_string(),
            )),
        }
    }

    /// Check everything the dispatcher needs is present.
    pub fn require_for_dispatch(&self) -> Result<()> {
        self.token()?;
        self.organization()?;
        Ok(())
    }

    /// Check everything a worker needs is present.
    pub fn require_for_worker(&self) -> Result<()> {
        self.token()?;
        self.identity()?;
        Ok(())
    }

    /// Spool directory for the job queue.
    pub fn queue_path(&self) -> PathBuf {
        self.queue_dir
            .clone()
            .unwrap_or_else(|| self.artifacts_dir.join("queue"))
    }

    /// Path of the append-only run ledger.
    pub fn events_path(&self) -> PathBuf {
        self.artifacts_dir.join("events.ndjson")
    }
}

fn read_token_file(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| {
        PatchstormError::Usage(format!(
            "failed to read token file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(PatchstormError::Usage(format!(
            "token file '{}' is empty",
            path.display()
        )));
    }
    Ok(token)
}
