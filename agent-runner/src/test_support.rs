//! Test-only fixtures: throwaway git repositories and scripted collaborators.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::provider::Provider;
use crate::io::executor::{ExecOutcome, ExecRequest, Executor};
use crate::io::git::Git;
use crate::io::provider::ProviderResolver;

/// A git repository in a temp dir with one commit (`README.md`) on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git_raw(&["init", "--quiet"])?;
        repo.git_raw(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git_raw(&["config", "user.name", "Agent Runner Tests"])?;
        repo.git_raw(&["config", "user.email", "tests@agent-runner.invalid"])?;
        repo.git_raw(&["config", "commit.gpgsign", "false"])?;
        repo.commit_file("README.md", "# fixture\n", "initial commit")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Git::new(self.dir.path())
    }

    /// Create `name` at the current HEAD without switching to it.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        self.git_raw(&["branch", name])
    }

    pub fn checkout(&self, name: &str) -> Result<()> {
        self.git_raw(&["checkout", "--quiet", name])
    }

    /// Write `rel` and commit it on the current branch.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<()> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        self.git_raw(&["add", "-A"])?;
        self.git_raw(&["commit", "--quiet", "-m", message])
    }

    fn git_raw(&self, args: &[&str]) -> Result<()> {
        git_stdout(self.dir.path(), args).map(drop)
    }
}

/// Branch checked out in the working tree at `dir`.
pub fn current_branch(dir: &Path) -> Result<String> {
    let name = git_stdout(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let name = name.trim();
    if name == "HEAD" {
        return Err(anyhow!("detached HEAD in {}", dir.display()));
    }
    Ok(name.to_string())
}

fn git_stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Outcome with the given exit code and stderr text.
pub fn outcome(exit_code: i32, stderr: &str) -> ExecOutcome {
    ExecOutcome {
        exit_code: Some(exit_code),
        stderr: stderr.to_string(),
    }
}

/// Executor that replays queued outcomes and records every request.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ExecOutcome>>,
    requests: Mutex<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<ExecOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().expect("requests mutex").clone()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        self.requests
            .lock()
            .expect("requests mutex")
            .push(request.clone());
        self.outcomes
            .lock()
            .expect("outcomes mutex")
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted outcome left"))
    }
}

/// Resolver that reports a fixed set of providers as installed.
#[derive(Debug, Clone)]
pub struct FakeResolver {
    installed: Vec<Provider>,
}

impl FakeResolver {
    pub fn new(installed: &[Provider]) -> Self {
        Self {
            installed: installed.to_vec(),
        }
    }

    pub fn all() -> Self {
        Self::new(&Provider::ALL)
    }
}

impl ProviderResolver for FakeResolver {
    fn resolve(&self, provider: Provider) -> Option<PathBuf> {
        self.installed
            .contains(&provider)
            .then(|| PathBuf::from("/opt/fake/bin").join(provider.binary()))
    }
}

/// Write an executable shell script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}
