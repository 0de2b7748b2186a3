//! Process-wide settings for patchstorm.
//!
//! Settings are built once at process start from defaults, an optional YAML
//! file, and an environment overlay, then passed by reference to the
//! resolver, dispatcher, and worker. Nothing else reads the environment.

mod model;
mod operations;


pub use model::{GitIdentity, Settings};
