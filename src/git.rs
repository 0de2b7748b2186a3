//! Git operations used by the execution workflow.
//!
//! All git operations go through a [`CommandRunner`] with `-C <dir>` and
//! discrete arguments. Authentication rides in the clone URL, which is
//! redacted from every displayed command and captured output.

use crate::error::{PatchstormError, Result};
use crate::process::{CommandOutput, CommandRunner, CommandSpec, run_checked};
use crate::settings::GitIdentity;
use std::path::Path;

/// Build a `git -C <dir> <args...>` command.
pub fn git_command<P: AsRef<Path>>(dir: P, args: &[&str]) -> CommandSpec {
    CommandSpec::new("git")
        .arg("-C")
        .arg(dir.as_ref().to_string_lossy())
        .args(args.iter().copied())
}

/// Run a git command in `dir`, failing on non-zero exit.
pub fn run_git<P: AsRef<Path>>(
    runner: &dyn CommandRunner,
    dir: P,
    args: &[&str],
) -> Result<CommandOutput> {
    run_checked(runner, &git_command(dir, args))
}

/// Authenticated HTTPS remote for `repo` (`owner/name`).
pub fn clone_url(git_host: &str, token: &str, repo: &str) -> String {
    format!("https://oauth2:{}@{}/{}.git", token, git_host, repo)
}

/// Clone `url` at its default branch into `dest`.
pub fn clone_repo(
    runner: &dyn CommandRunner,
    url: &str,
    token: &str,
    dest: &Path,
) -> Result<()> {
    let spec = CommandSpec::new("git")
        .args(["clone", url])
        .arg(dest.to_string_lossy())
        .redact(token);
    run_checked(runner, &spec)?;
    Ok(())
}

/// Stage every change in the working tree, including untracked files.
pub fn stage_all(runner: &dyn CommandRunner, dir: &Path) -> Result<()> {
    run_git(runner, dir, &["add", "--all"])?;
    Ok(())
}

/// Whether the index differs from `HEAD`.
///
/// Uses `git diff --cached --quiet HEAD`: exit 0 means no difference, exit 1
/// means staged changes exist, anything else is a failure.
pub fn has_staged_changes(runner: &dyn CommandRunner, dir: &Path) -> Result<bool> {
    let spec = git_command(dir, &["diff", "--cached", "--quiet", "HEAD"]);
    let output = runner.run(&spec)?;
    match output.status {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        status => Err(PatchstormError::CommandFailure {
            command: spec.to_string(),
            status,
            output: output.output.trim().to_string(),
        }),
    }
}

/// Create and switch to a new branch.
pub fn create_branch(runner: &dyn CommandRunner, dir: &Path, branch: &str) -> Result<()> {
    run_git(runner, dir, &["checkout", "-b", branch])?;
    Ok(())
}

/// Commit the index with the given author identity.
///
/// Identity is passed with `-c` so no git config file is modified.
pub fn commit(
    runner: &dyn CommandRunner,
    dir: &Path,
    identity: &GitIdentity,
    message: &str,
) -> Result<()> {
    let name = format!("user.name={}", identity.name);
    let email = format!("user.email={}", identity.email);
    run_git(
        runner,
        dir,
        &["-c", &name, "-c", &email, "commit", "-m", message],
    )?;
    Ok(())
}

/// Push `branch` to `origin`. The token is scrubbed from any failure output.
pub fn push_branch(
    runner: &dyn CommandRunner,
    dir: &Path,
    branch: &str,
    token: &str,
) -> Result<()> {
    let spec = git_command(dir, &["push", "origin", branch]).redact(token);
    run_checked(runner, &spec)?;
    Ok(())
}
