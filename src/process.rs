//! Subprocess execution.
//!
//! Every external tool (git, gh, docker) is started from a [`CommandSpec`]:
//! a program plus discrete arguments, never a shell string. Runners return
//! the combined stdout/stderr stream in the order the child wrote it.
//!
//! Secret values (tokens embedded in clone URLs, credential env vars) are
//! registered on the spec and replaced with `***` whenever the command is
//! displayed or logged.

use crate::error::{PatchstormError, Result};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const REDACTED: &str = "***";

/// A command to run: program, arguments, extra environment, working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set an environment variable whose value must never be displayed.
    pub fn secret_env(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.redact(value.clone()).env(key, value)
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Register a value to mask wherever it appears in the displayed command.
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Mask registered secrets in arbitrary text (e.g. captured output).
    pub fn scrub(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, s| acc.replace(s.as_str(), REDACTED))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        f.write_str(&self.scrub(&shell_words::join(words)))
    }
}

/// Exit status and combined output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub status: Option<i32>,
    /// Interleaved stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Something that can run a [`CommandSpec`].
///
/// `run` returns `Ok` for any exit status; only a failure to start the
/// process is an error. Use [`run_checked`] to treat non-zero as failure.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Run a command and turn a non-zero exit into [`PatchstormError::CommandFailure`].
pub fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(spec)?;
    if output.success() {
        Ok(output)
    } else {
        Err(PatchstormError::CommandFailure {
            command: spec.to_string(),
            status: output.status,
            output: spec.scrub(output.output.trim()),
        })
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let spawn_failure = |e: std::io::Error| PatchstormError::CommandFailure {
            command: spec.to_string(),
            status: None,
            output: format!("failed to start {}: {}", spec.program, e),
        };

        // One pipe for both streams keeps the child's write order.
        let (mut reader, writer) = std::io::pipe().map_err(spawn_failure)?;
        let stderr_writer = writer.try_clone().map_err(spawn_failure)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(spawn_failure)?;
        // The parent's copies of the write end must close or the read never ends.
        drop(command);

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map_err(spawn_failure)?;
        let status = child.wait().map_err(spawn_failure)?;

        Ok(CommandOutput {
            status: status.code(),
            output: String::from_utf8_lossy(&buffer).into_owned(),
        })
    }
}
