//! Rename-based file moves.
//!
//! The spool queue changes a job's state by moving its envelope between
//! directories. On one filesystem `rename(2)` is atomic, so when several
//! workers race to claim the same envelope exactly one succeeds and the rest
//! see the source vanish.

use crate::error::{PatchstormError, Result};
use std::fs;
use std::io;
use std::path::Path;

/// Outcome of [`try_move_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The file now lives at the destination.
    Moved,
    /// The source was already gone (someone else moved it first).
    SourceMissing,
}

/// Move `source` to `destination`, creating the destination's parent.
///
/// A missing source is reported as [`MoveOutcome::SourceMissing`] rather
/// than an error.
pub fn try_move_file<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    destination: Q,
) -> Result<MoveOutcome> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            PatchstormError::Queue(format!(
                "failed to create destination directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    match fs::rename(source, destination) {
        Ok(()) => Ok(MoveOutcome::Moved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(MoveOutcome::SourceMissing),
        Err(e) if is_cross_device_rename(&e) => Err(PatchstormError::Queue(format!(
            "'{}' and '{}' are on different filesystems; the queue directory must live on a single volume",
            source.display(),
            destination.display()
        ))),
        Err(e) => Err(PatchstormError::Queue(format!(
            "failed to move '{}' to '{}': {}",
            source.display(),
            destination.display(),
            e
        ))),
    }
}

fn is_cross_device_rename(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices || err.raw_os_error() == Some(18)
}
