use crate::error::{PatchstormError, Result};
use crate::github::{CodeHost, PullRequestSummary};
use crate::process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
use crate::queue::{ClaimedJob, JobEnvelope, JobQueue};
use crate::settings::Settings;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use uuid::Uuid;

pub(crate) fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path();

    git(path, &["init"]);
    // Deterministic default branch name across environments.
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test User"]);

    std::fs::write(path.join("README.md"), "# Test\n").unwrap();
    git(path, &["add", "."]);
    git(path, &["commit", "-m", "Initial commit"]);

    temp_dir
}

/// Run git in `repo_dir`, panicking on failure. Returns stdout.
pub(crate) fn git(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "git {} failed (exit code {:?})\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status.code(),
            stdout,
            stderr
        );
    }

    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Settings for a worker writing into `artifacts`.
pub(crate) fn test_settings(artifacts: &Path) -> Settings {
    Settings {
        github_organization: Some("acme".to_string()),
        github_token: Some("tok-secret".to_string()),
        git_name: Some("Patch Bot".to_string()),
        git_email: Some("bot@example.com".to_string()),
        artifacts_dir: artifacts.to_path_buf(),
        ..Settings::default()
    }
}

type AgentScript = Box<dyn Fn(&Path) -> CommandOutput>;

/// A [`CommandRunner`] for workflow tests.
///
/// - `git clone` clones the local `origin` repository instead of the URL
/// - `git push` and `gh` succeed without doing anything
/// - `docker` runs the agent script against the mounted work dir
/// - every other command runs for real
///
/// Every command is recorded.
pub(crate) struct ScriptedRunner {
    origin: Option<PathBuf>,
    agent: AgentScript,
    calls: RefCell<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self {
            origin: None,
            agent: Box::new(|_| ok_output("")),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn with_origin(mut self, origin: &Path) -> Self {
        self.origin = Some(origin.to_path_buf());
        self
    }

    /// Replace the agent: `script` gets the work dir and returns the container output.
    pub(crate) fn with_agent<F>(mut self, script: F) -> Self
    where
        F: Fn(&Path) -> CommandOutput + 'static,
    {
        self.agent = Box::new(script);
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// Recorded commands whose program is `program`.
    pub(crate) fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    /// Recorded git commands whose subcommand (after `-C <dir>`) is `sub`.
    pub(crate) fn git_calls(&self, sub: &str) -> Vec<CommandSpec> {
        self.calls_to("git")
            .into_iter()
            .filter(|c| git_subcommand(c) == Some(sub))
            .collect()
    }
}

fn git_subcommand(spec: &CommandSpec) -> Option<&str> {
    let mut args = spec.args.iter().map(String::as_str);
    loop {
        match args.next()? {
            "-C" | "-c" => {
                args.next()?;
            }
            other => return Some(other),
        }
    }
}

/// The host side of the `-v <host>:/repo` mount.
fn mounted_work_dir(spec: &CommandSpec) -> Option<PathBuf> {
    spec.args
        .iter()
        .find_map(|a| a.strip_suffix(":/repo"))
        .map(PathBuf::from)
}

pub(crate) fn ok_output(text: &str) -> CommandOutput {
    CommandOutput {
        status: Some(0),
        output: text.to_string(),
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(spec.clone());

        match spec.program.as_str() {
            "docker" => {
                let work_dir = mounted_work_dir(spec).ok_or_else(|| {
                    PatchstormError::Usage(format!("docker call without /repo mount: {}", spec))
                })?;
                Ok((self.agent)(&work_dir))
            }
            "gh" => Ok(ok_output("https://github.com/acme/api/pull/1\n")),
            "git" => match (git_subcommand(spec), &self.origin) {
                (Some("push"), _) => Ok(ok_output("")),
                (Some("clone"), Some(origin)) => {
                    let dest = spec.args.last().cloned().unwrap_or_default();
                    SystemRunner.run(
                        &CommandSpec::new("git")
                            .arg("clone")
                            .arg(origin.to_string_lossy())
                            .arg(dest),
                    )
                }
                _ => SystemRunner.run(spec),
            },
            _ => SystemRunner.run(spec),
        }
    }
}

/// In-memory [`CodeHost`].
#[derive(Default)]
pub(crate) struct FakeCodeHost {
    open_titles: BTreeMap<String, Vec<String>>,
    search_results: BTreeMap<String, BTreeSet<String>>,
    unreachable: BTreeSet<String>,
    pub(crate) searches: RefCell<Vec<String>>,
}

impl FakeCodeHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_open_pr(mut self, repo: &str, title: &str) -> Self {
        self.open_titles
            .entry(repo.to_string())
            .or_default()
            .push(title.to_string());
        self
    }

    pub(crate) fn with_search(mut self, query: &str, repos: &[&str]) -> Self {
        self.search_results.insert(
            query.to_string(),
            repos.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Make every pull-request lookup for `repo` fail.
    pub(crate) fn with_unreachable(mut self, repo: &str) -> Self {
        self.unreachable.insert(repo.to_string());
        self
    }
}

impl CodeHost for FakeCodeHost {
    fn open_pull_requests(&self, repo: &str) -> Result<Vec<PullRequestSummary>> {
        if self.unreachable.contains(repo) {
            return Err(PatchstormError::TransientService(format!(
                "GET /repos/{}/pulls timed out",
                repo
            )));
        }
        let titles = self.open_titles.get(repo).cloned().unwrap_or_default();
        Ok(titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| PullRequestSummary {
                number: i as u64 + 1,
                title,
                html_url: String::new(),
                draft: false,
            })
            .collect())
    }

    fn search_repositories(&self, query: &str) -> Result<BTreeSet<String>> {
        self.searches.borrow_mut().push(query.to_string());
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }
}

/// In-memory [`JobQueue`].
#[derive(Default)]
pub(crate) struct MemoryQueue {
    pending: RefCell<VecDeque<JobEnvelope>>,
    pub(crate) done: RefCell<Vec<JobEnvelope>>,
    pub(crate) failed: RefCell<Vec<JobEnvelope>>,
}

impl MemoryQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pending(&self) -> Vec<JobEnvelope> {
        self.pending.borrow().iter().cloned().collect()
    }
}

impl JobQueue for MemoryQueue {
    fn submit(&self, envelope: &JobEnvelope) -> Result<Uuid> {
        self.pending.borrow_mut().push_back(envelope.clone());
        Ok(envelope.id)
    }

    fn claim_next(&self) -> Result<Option<ClaimedJob>> {
        Ok(self
            .pending
            .borrow_mut()
            .pop_front()
            .map(|envelope| ClaimedJob { envelope }))
    }

    fn complete(&self, job: &ClaimedJob) -> Result<()> {
        self.done.borrow_mut().push(job.envelope.clone());
        Ok(())
    }

    fn fail(&self, job: &ClaimedJob, reason: &str) -> Result<()> {
        let mut envelope = job.envelope.clone();
        envelope.last_error = Some(reason.to_string());
        self.failed.borrow_mut().push(envelope);
        Ok(())
    }
}
