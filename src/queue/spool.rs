//! Spool-directory queue on shared storage.
//!
//! Layout:
//!
//! ```text
//! <queue_dir>/
//!   pending/   submitted, waiting for a worker
//!   claimed/   owned by exactly one worker
//!   done/      finished (with or without a PR)
//!   failed/    dead letter; envelope records the error
//! ```
//!
//! Every state change is an atomic write or a rename within the same volume.

use super::{ClaimedJob, JobEnvelope, JobQueue};
use crate::error::{PatchstormError, Result};
use crate::fs::{MoveOutcome, atomic_write_file, try_move_file};
use chrono::{DateTime, Duration, Utc};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PENDING: &str = "pending";
const CLAIMED: &str = "claimed";
const DONE: &str = "done";
const FAILED: &str = "failed";

/// Job counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: usize,
    pub claimed: usize,
    pub done: usize,
    pub failed: usize,
}

/// File-backed [`JobQueue`].
#[derive(Debug, Clone)]
pub struct FsQueue {
    root: PathBuf,
}

impl FsQueue {
    /// Open (and create if needed) a spool rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for state in [PENDING, CLAIMED, DONE, FAILED] {
            let dir = root.join(state);
            fs::create_dir_all(&dir).map_err(|e| {
                PatchstormError::Queue(format!(
                    "failed to create queue directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, state: &str) -> PathBuf {
        self.root.join(state)
    }

    /// Envelope file names in `state`, oldest first.
    fn entries(&self, state: &str) -> Result<Vec<String>> {
        let dir = self.dir(state);
        let read = fs::read_dir(&dir).map_err(|e| {
            PatchstormError::Queue(format!("failed to list '{}': {}", dir.display(), e))
        })?;

        let mut names = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| {
                PatchstormError::Queue(format!("failed to list '{}': {}", dir.display(), e))
            })?;
            let name = entry.file_name().to_string_lossy().to_string();
            // Skip in-flight temp files from atomic writes.
            if name.ends_with(".json") && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_envelope(path: &Path) -> Result<JobEnvelope> {
        let content = fs::read_to_string(path).map_err(|e| {
            PatchstormError::Queue(format!("failed to read '{}': {}", path.display(), e))
        })?;
        JobEnvelope::from_json(&content)
    }

    fn write_envelope(path: &Path, envelope: &JobEnvelope) -> Result<()> {
        atomic_write_file(path, &envelope.to_json()?)
            .map_err(|e| PatchstormError::Queue(e.to_string()))
    }

    /// Stamp `path` with the current time as its modification time.
    ///
    /// Done on the pending file just before the claiming rename, which keeps
    /// the mtime, so a claimed envelope carries its claim time even before
    /// `claimed_at` is written.
    fn touch(path: &Path) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .open(path)?
            .set_modified(SystemTime::now())
    }

    fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    /// Move an envelope that cannot be decoded from `claimed/` to `failed/`
    /// as-is.
    fn dead_letter_raw(&self, name: &str, error: &PatchstormError) -> Result<()> {
        warn!(file = %name, error = %error, "moving undecodable job to failed");
        try_move_file(self.dir(CLAIMED).join(name), self.dir(FAILED).join(name))?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PatchstormError::Queue(format!(
                "failed to remove '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Count envelopes in every state.
    pub fn status(&self) -> Result<QueueStatus> {
        Ok(QueueStatus {
            pending: self.entries(PENDING)?.len(),
            claimed: self.entries(CLAIMED)?.len(),
            done: self.entries(DONE)?.len(),
            failed: self.entries(FAILED)?.len(),
        })
    }

    /// Return claimed jobs older than `max_age` to `pending/`, bumping their
    /// delivery count. Returns how many were requeued.
    ///
    /// This is the redelivery path for workers that crashed mid-job. A job
    /// that is merely slow will run twice.
    pub fn requeue_stale(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let mut requeued = 0;

        for name in self.entries(CLAIMED)? {
            let claimed_path = self.dir(CLAIMED).join(&name);
            let mut envelope = match Self::read_envelope(&claimed_path) {
                Ok(envelope) => envelope,
                Err(e) => {
                    self.dead_letter_raw(&name, &e)?;
                    continue;
                }
            };

            // Without `claimed_at` the claim is still being recorded; the
            // file's mtime is the claim time.
            let since = envelope
                .claimed_at
                .or_else(|| Self::modified_at(&claimed_path))
                .unwrap_or(envelope.enqueued_at);
            if since > cutoff {
                continue;
            }

            envelope.delivery_count += 1;
            envelope.claimed_at = None;
            Self::write_envelope(&self.dir(PENDING).join(&name), &envelope)?;
            Self::remove(&claimed_path)?;

            info!(
                job = %envelope.id,
                delivery = envelope.delivery_count,
                "requeued stale job"
            );
            requeued += 1;
        }

        Ok(requeued)
    }
}

impl JobQueue for FsQueue {
    fn submit(&self, envelope: &JobEnvelope) -> Result<Uuid> {
        let path = self.dir(PENDING).join(envelope.file_name());
        Self::write_envelope(&path, envelope)?;
        debug!(job = %envelope.id, path = %path.display(), "job submitted");
        Ok(envelope.id)
    }

    fn claim_next(&self) -> Result<Option<ClaimedJob>> {
        for name in self.entries(PENDING)? {
            let source = self.dir(PENDING).join(&name);
            let target = self.dir(CLAIMED).join(&name);

            match Self::touch(&source) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %name, "lost claim race, trying next job");
                    continue;
                }
                Err(e) => {
                    return Err(PatchstormError::Queue(format!(
                        "failed to claim '{}': {}",
                        source.display(),
                        e
                    )));
                }
            }

            match try_move_file(&source, &target)? {
                MoveOutcome::SourceMissing => {
                    debug!(file = %name, "lost claim race, trying next job");
                    continue;
                }
                MoveOutcome::Moved => {}
            }

            let mut envelope = match Self::read_envelope(&target) {
                Ok(envelope) => envelope,
                Err(e) => {
                    self.dead_letter_raw(&name, &e)?;
                    continue;
                }
            };
            envelope.claimed_at = Some(Utc::now());
            Self::write_envelope(&target, &envelope)?;

            return Ok(Some(ClaimedJob { envelope }));
        }
        Ok(None)
    }

    fn complete(&self, job: &ClaimedJob) -> Result<()> {
        let name = job.envelope.file_name();
        let outcome = try_move_file(self.dir(CLAIMED).join(&name), self.dir(DONE).join(&name))?;
        if outcome == MoveOutcome::SourceMissing {
            warn!(job = %job.id(), "completed job was no longer claimed (requeued?)");
        }
        Ok(())
    }

    fn fail(&self, job: &ClaimedJob, reason: &str) -> Result<()> {
        let name = job.envelope.file_name();
        let mut envelope = job.envelope.clone();
        envelope.last_error = Some(reason.to_string());

        Self::write_envelope(&self.dir(FAILED).join(&name), &envelope)?;
        Self::remove(&self.dir(CLAIMED).join(&name))
    }
}
