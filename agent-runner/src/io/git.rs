//! Git adapter for workspace provisioning.
//!
//! The runner only needs a handful of porcelain commands, so we keep a small,
//! explicit wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True if `reference` resolves to a commit.
    pub fn ref_exists(&self, reference: &str) -> Result<bool> {
        let rev = format!("{reference}^{{commit}}");
        let status = self
            .run(&["rev-parse", "--verify", "--quiet", &rev])?
            .status;
        debug!(reference, exists = status.success(), "probed ref");
        Ok(status.success())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Paths of all working trees registered with this repository.
    pub fn worktree_paths(&self) -> Result<Vec<PathBuf>> {
        let out = self.run_capture(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }

    /// Refresh remote-tracking refs. Failure is logged, not returned.
    #[instrument(skip_all)]
    pub fn fetch_all_prune(&self) {
        match self.run_checked(&["fetch", "--all", "--prune"]) {
            Ok(_) => debug!("fetched remotes"),
            Err(err) => warn!(err = %err, "git fetch failed, continuing with local refs"),
        }
    }

    /// Attach a new working tree at `dir` to an existing `branch`.
    #[instrument(skip_all, fields(branch = %branch, dir = %dir.display()))]
    pub fn add_worktree(&self, dir: &Path, branch: &str) -> Result<()> {
        let dir = path_arg(dir)?;
        self.run_checked(&["worktree", "add", dir, branch])?;
        Ok(())
    }

    /// Create `branch` from `base` and attach a working tree for it at `dir`.
    #[instrument(skip_all, fields(branch = %branch, base = %base, dir = %dir.display()))]
    pub fn add_worktree_new_branch(&self, branch: &str, dir: &Path, base: &str) -> Result<()> {
        let dir = path_arg(dir)?;
        self.run_checked(&["worktree", "add", "-b", branch, dir, base])?;
        Ok(())
    }

    /// `git diff <base>..<head>`.
    pub fn diff_range(&self, base: &str, head: &str) -> Result<String> {
        self.run_capture(&["diff", &format!("{base}..{head}")])
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(anyhow!("git {} failed: {}", args.join(" "), detail));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path is not valid UTF-8: {}", path.display()))
}

/// Extract `worktree <path>` entries from `git worktree list --porcelain`.
fn parse_worktree_list(porcelain: &str) -> Vec<PathBuf> {
    porcelain
        .lines()
        .filter_map(|line| line.strip_prefix("worktree "))
        .map(|path| PathBuf::from(path.trim_end()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worktree_porcelain() {
        let out = "worktree /repo\nHEAD 1234\nbranch refs/heads/main\n\nworktree /tmp/agent-feat-x\nHEAD 5678\nbranch refs/heads/feat/x\n\n";
        assert_eq!(
            parse_worktree_list(out),
            vec![PathBuf::from("/repo"), PathBuf::from("/tmp/agent-feat-x")]
        );
    }

    #[test]
    fn parses_empty_listing() {
        assert!(parse_worktree_list("").is_empty());
    }
}
