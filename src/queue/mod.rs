//! Job queue between the dispatcher and the workers.
//!
//! The dispatcher submits one [`JobEnvelope`] per repository; workers claim
//! envelopes, run them, and mark them complete or failed. Delivery is
//! at-least-once: a claimed envelope whose worker disappears is put back by
//! `requeue_stale` and may run again.

mod spool;

pub use spool::{FsQueue, QueueStatus};

use crate::error::{PatchstormError, Result};
use crate::run_config::RunConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One queued job. `payload` is the serialized per-repository [`RunConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    /// How many times the job has been handed to a worker, this one included.
    pub delivery_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub payload: String,
}

impl JobEnvelope {
    pub fn new(payload: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            delivery_count: 1,
            claimed_at: None,
            last_error: None,
            payload,
        }
    }

    /// Wrap a config for submission.
    pub fn for_config(config: &RunConfig) -> Result<Self> {
        Ok(Self::new(config.to_json()?))
    }

    /// Decode the payload back into a config.
    pub fn config(&self) -> Result<RunConfig> {
        RunConfig::from_json(&self.payload)
    }

    /// Spool file name. Sorts by enqueue time, so pending jobs are claimed
    /// oldest first.
    pub(crate) fn file_name(&self) -> String {
        format!(
            "{}-{}.json",
            self.enqueued_at.format("%Y%m%dT%H%M%S%.6fZ"),
            self.id.simple()
        )
    }

    pub(crate) fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PatchstormError::Queue(format!("failed to encode job {}: {}", self.id, e)))
    }

    pub(crate) fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PatchstormError::Queue(format!("failed to decode job envelope: {}", e)))
    }
}

/// A job a worker has exclusively claimed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub envelope: JobEnvelope,
}

impl ClaimedJob {
    pub fn id(&self) -> Uuid {
        self.envelope.id
    }
}

/// Transport for per-repository jobs.
pub trait JobQueue {
    /// Enqueue a job and return its id. Does not wait for execution.
    fn submit(&self, envelope: &JobEnvelope) -> Result<Uuid>;

    /// Take the oldest pending job, if any. At most one caller gets each job.
    fn claim_next(&self) -> Result<Option<ClaimedJob>>;

    /// Mark a claimed job as finished.
    fn complete(&self, job: &ClaimedJob) -> Result<()>;

    /// Move a claimed job to the dead-letter state, recording `reason`.
    fn fail(&self, job: &ClaimedJob, reason: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_config::{AgentProvider, RunFlags};
    use std::collections::BTreeSet;

    #[test]
    fn test_envelope_carries_config_payload() {
        let config = RunConfig::new(
            "Pin actions",
            vec!["pin every action to a sha".to_string()],
            AgentProvider::Codex,
            BTreeSet::from(["acme/api".to_string()]),
            BTreeSet::new(),
            RunFlags::default(),
        )
        .unwrap();

        let envelope = JobEnvelope::for_config(&config).unwrap();
        let decoded = JobEnvelope::from_json(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.delivery_count, 1);
        assert_eq!(decoded.config().unwrap(), config);
    }

    #[test]
    fn test_file_names_sort_by_enqueue_time() {
        let mut first = JobEnvelope::new("{}".to_string());
        let mut second = JobEnvelope::new("{}".to_string());
        first.enqueued_at = "2025-01-01T00:00:00.000001Z".parse().unwrap();
        second.enqueued_at = "2025-01-01T00:00:00.000002Z".parse().unwrap();

        assert!(first.file_name() < second.file_name());
        assert!(first.file_name().ends_with(".json"));
    }

    #[test]
    fn test_garbage_payload_is_a_definition_error() {
        let envelope = JobEnvelope::new("not json".to_string());
        assert!(matches!(
            envelope.config().unwrap_err(),
            PatchstormError::Definition(_)
        ));
    }
}
