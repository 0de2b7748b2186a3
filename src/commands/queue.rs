//! Implementation of the `patchstorm queue` subcommands.

use crate::cli::RequeueStaleArgs;
use crate::error::{PatchstormError, Result};
use crate::queue::FsQueue;
use crate::settings::Settings;
use chrono::Duration;

/// Execute `patchstorm queue status`.
pub fn cmd_queue_status(settings: &Settings) -> Result<()> {
    let queue = FsQueue::open(settings.queue_path())?;
    let status = queue.status()?;

    println!("Queue: {}", queue.root().display());
    println!("  pending: {}", status.pending);
    println!("  claimed: {}", status.claimed);
    println!("  done:    {}", status.done);
    println!("  failed:  {}", status.failed);
    Ok(())
}

/// Execute `patchstorm queue requeue-stale`.
pub fn cmd_requeue_stale(settings: &Settings, args: RequeueStaleArgs) -> Result<()> {
    if args.older_than_mins <= 0 {
        return Err(PatchstormError::Usage(
            "--older-than-mins must be positive".to_string(),
        ));
    }
    let queue = FsQueue::open(settings.queue_path())?;
    let requeued = queue.requeue_stale(Duration::minutes(args.older_than_mins))?;

    println!("Requeued {} stale job(s).", requeued);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobEnvelope, JobQueue};
    use crate::test_support::test_settings;
    use tempfile::TempDir;

    #[test]
    fn test_status_opens_queue_under_artifacts() {
        let artifacts = TempDir::new().unwrap();
        let settings = test_settings(artifacts.path());

        cmd_queue_status(&settings).unwrap();
        assert!(artifacts.path().join("queue").join("pending").is_dir());
    }

    #[test]
    fn test_requeue_rejects_non_positive_age() {
        let artifacts = TempDir::new().unwrap();
        let settings = test_settings(artifacts.path());

        let err = cmd_requeue_stale(&settings, RequeueStaleArgs { older_than_mins: 0 }).unwrap_err();
        assert!(matches!(err, PatchstormError::Usage(_)));
    }

    #[test]
    fn test_requeue_leaves_fresh_claims() {
        let artifacts = TempDir::new().unwrap();
        let settings = test_settings(artifacts.path());
        let queue = FsQueue::open(settings.queue_path()).unwrap();
        queue.submit(&JobEnvelope::new("p".to_string())).unwrap();
        queue.claim_next().unwrap().unwrap();

        cmd_requeue_stale(&settings, RequeueStaleArgs { older_than_mins: 5 }).unwrap();
        assert_eq!(queue.status().unwrap().claimed, 1);
    }
}
