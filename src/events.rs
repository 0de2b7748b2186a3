//! Append-only run ledger.
//!
//! Dispatchers and workers record what they did in `events.ndjson` under the
//! artifacts root, one JSON object per line. The ledger is a durable audit
//! trail next to the tracing output; nothing in patchstorm reads it back to
//! make decisions.
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (`job_submitted`, `run_failed`, ...)
//! - `actor`: `user@HOST` of the writing process
//! - `repo`: target repository, if the event concerns one
//! - `run_id`: run identifier, for worker-side events
//! - `details`: freeform object with action-specific fields

use crate::error::{PatchstormError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Actions recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// A per-repository job was put on the queue.
    JobSubmitted,
    /// A repository was left out of the batch (duplicate PR or API failure).
    JobSkipped,
    /// A worker began executing a job.
    RunStarted,
    /// A run reached a terminal state.
    RunCompleted,
    /// A run aborted with an error.
    RunFailed,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::JobSubmitted => write!(f, "job_submitted"),
            EventAction::JobSkipped => write!(f, "job_skipped"),
            EventAction::RunStarted => write!(f, "run_started"),
            EventAction::RunCompleted => write!(f, "run_completed"),
            EventAction::RunFailed => write!(f, "run_failed"),
        }
    }
}

/// One ledger record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub action: EventAction,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub details: Value,
}

impl Event {
    /// Create an event stamped with the current time and actor.
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: actor_string(),
            repo: None,
            run_id: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| PatchstormError::Usage(format!("failed to serialize event to JSON: {}", e)))
    }
}

fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append an event to the ledger at `path`, creating the file and its parent
/// directory if needed.
///
/// Several workers may share one ledger. Each event is written with a single
/// `write` on an `O_APPEND` handle, so lines do not interleave.
pub fn append_event(path: &Path, event: &Event) -> Result<()> {
    let mut line = event.to_ndjson_line()?;
    line.push('\n');

    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).map_err(|e| {
            PatchstormError::Usage(format!(
                "failed to create events directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            PatchstormError::Usage(format!(
                "failed to open events file '{}': {}",
                path.display(),
                e
            ))
        })?;

    file.write_all(line.as_bytes()).map_err(|e| {
        PatchstormError::Usage(format!(
            "failed to write event to '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Append an event, logging instead of failing.
///
/// The ledger is secondary to the work it records: a full disk must not turn
/// a successful pull request into a failed job.
pub fn record(path: &Path, event: &Event) {
    if let Err(e) = append_event(path, event) {
        tracing::warn!(action = %event.action, error = %e, "failed to append to run ledger");
    }
}
