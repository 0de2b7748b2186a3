//! Filesystem utilities for patchstorm.
//!
//! Atomic writes and rename-based moves used by the spool queue and the
//! per-run artifact files.

pub mod atomic;
mod move_file;

pub use atomic::{atomic_write, atomic_write_file};
pub use move_file::{MoveOutcome, try_move_file};
