//! Coding-agent invocation.
//!
//! Agents run inside a container with the cloned repository mounted at
//! `/repo` and are expected to edit it in place. The two providers differ:
//!
//! - `codex` takes a single prompt as the container argument
//! - `claude_code` runs a generated shell script; the first prompt starts a
//!   session and each later prompt continues it
//!
//! Provider credentials are forwarded by name (`-e ANTHROPIC_API_KEY`), so
//! their values never appear on a command line.

pub mod metadata;

pub use metadata::ExecutionMetadata;

use crate::error::{PatchstormError, Result};
use crate::fs::atomic_write_file;
use crate::process::{CommandRunner, CommandSpec, run_checked};
use crate::run_config::{AgentProvider, RunConfig};
use crate::settings::Settings;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CLAUDE_FLAGS: &str = "--dangerously-skip-permissions --output-format stream-json --verbose";
const SCRIPT_MOUNT: &str = "/claude_cmds.sh";

/// Fail unless the provider can run every prompt of `config`.
pub fn ensure_supported(config: &RunConfig) -> Result<()> {
    let provider = config.agent_provider();
    if config.prompts().len() > 1 && !provider.supports_multiple_prompts() {
        return Err(PatchstormError::UnsupportedConfiguration(format!(
            "multiple prompts are not supported for {} ({} given); use a single prompt or claude_code",
            provider,
            config.prompts().len()
        )));
    }
    Ok(())
}

/// The container command for a run, plus the session script it mounts.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub command: CommandSpec,
    pub script: Option<SessionScript>,
}

/// A generated script and where it must be written before the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScript {
    pub path: PathBuf,
    pub contents: String,
}

/// Build the invocation without running anything.
pub fn build_invocation(
    settings: &Settings,
    config: &RunConfig,
    work_dir: &Path,
    run_id: &str,
) -> Result<AgentInvocation> {
    ensure_supported(config)?;

    let repo_mount = format!("{}:/repo", work_dir.display());
    let env_file = settings
        .agent_env_file
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());

    match config.agent_provider() {
        AgentProvider::Codex => {
            let mut command = CommandSpec::new("docker")
                .args(["run", "--rm", "-v"])
                .arg(repo_mount)
                .args(["--workdir", "/repo", "-e", "OPENAI_API_KEY"]);
            if let Some(env_file) = env_file {
                command = command.arg("--env-file").arg(env_file);
            }
            let command = command
                .arg(settings.codex_image.as_str())
                .arg(config.prompts()[0].as_str());

            Ok(AgentInvocation {
                command,
                script: None,
            })
        }
        AgentProvider::ClaudeCode => {
            let path = settings.artifacts_dir.join(format!("{}_script.sh", run_id));
            let contents = claude_script(config.prompts());

            let mut command = CommandSpec::new("docker")
                .args(["run", "--rm", "-v"])
                .arg(repo_mount)
                .arg("-v")
                .arg(format!("{}:{}", path.display(), SCRIPT_MOUNT))
                .args(["-e", "ANTHROPIC_API_KEY", "--workdir", "/repo"]);
            if let Some(env_file) = env_file {
                command = command.arg("--env-file").arg(env_file);
            }
            let command = command
                .arg(settings.claude_image.as_str())
                .args(["bash", SCRIPT_MOUNT]);

            Ok(AgentInvocation {
                command,
                script: Some(SessionScript { path, contents }),
            })
        }
    }
}

/// Shell script running every prompt in one Claude Code session.
pub fn claude_script(prompts: &[String]) -> String {
    let mut script = String::from("#!/bin/bash\nset -ex\n");
    for (i, prompt) in prompts.iter().enumerate() {
        let continuation = if i == 0 { "" } else { " --continue" };
        script.push_str(&format!(
            "claude {} -p{} {}\n",
            CLAUDE_FLAGS,
            continuation,
            shell_words::quote(prompt)
        ));
    }
    script
}

/// Run the agent for `config` against `work_dir` and return its combined
/// output.
///
/// A non-zero container exit is a `CommandFailure` carrying the output.
pub fn run(
    runner: &dyn CommandRunner,
    settings: &Settings,
    config: &RunConfig,
    work_dir: &Path,
    run_id: &str,
) -> Result<String> {
    let invocation = build_invocation(settings, config, work_dir, run_id)?;

    if let Some(script) = &invocation.script {
        debug!(path = %script.path.display(), "writing session script");
        atomic_write_file(&script.path, &script.contents)?;
    }

    info!(
        run_id,
        agent = %config.agent_provider(),
        prompts = config.prompts().len(),
        "starting agent container"
    );
    debug!(command = %invocation.command, "agent command");

    let output = run_checked(runner, &invocation.command)?;
    Ok(output.output)
}
