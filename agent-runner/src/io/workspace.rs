//! Isolated working trees per run.
//!
//! Implement runs get their own `git worktree` so the agent never touches the
//! operator's checkout. Existing worktrees are reused as-is; nothing here
//! removes or cleans a worktree.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::types::BaseRef;
use crate::io::git::Git;

/// How [`ensure_workspace`] satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// A worktree was already registered at the directory.
    Existing,
    /// The branch existed; a new worktree was attached to it.
    AttachedBranch,
    /// The branch was created from the base ref together with its worktree.
    CreatedBranch,
}

/// Resolve the base reference for new branches.
///
/// Explicit refs are returned unchanged. `auto` probes `candidates` in order
/// and falls back to `HEAD` when none resolves.
pub fn resolve_base_ref(git: &Git, preference: &BaseRef, candidates: &[String]) -> Result<String> {
    if let BaseRef::Explicit(reference) = preference {
        return Ok(reference.clone());
    }
    for candidate in candidates {
        if git.ref_exists(candidate)? {
            debug!(base = %candidate, "resolved base ref");
            return Ok(candidate.clone());
        }
    }
    debug!("no integration branch found, using HEAD");
    Ok("HEAD".to_string())
}

/// Make sure a worktree for `branch` exists at `dir`.
#[instrument(skip_all, fields(branch = %branch, dir = %dir.display(), base = %base))]
pub fn ensure_workspace(git: &Git, branch: &str, dir: &Path, base: &str) -> Result<Provisioned> {
    let registered = git.worktree_paths().context("list worktrees")?;
    if registered.iter().any(|path| same_path(path, dir)) {
        debug!("worktree already registered");
        return Ok(Provisioned::Existing);
    }

    git.fetch_all_prune();

    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create worktree parent {}", parent.display()))?;
    }

    let provisioned = if git.branch_exists(branch)? {
        git.add_worktree(dir, branch)
            .context("failed to create worktree")?;
        Provisioned::AttachedBranch
    } else {
        git.add_worktree_new_branch(branch, dir, base)
            .context("failed to create worktree")?;
        Provisioned::CreatedBranch
    };
    info!(?provisioned, "worktree ready");
    Ok(provisioned)
}

/// `git diff <base>..HEAD` inside `cwd`, for review-mode prompts.
pub fn review_diff(cwd: &Path, base: &str) -> Result<String> {
    Git::new(cwd)
        .diff_range(base, "HEAD")
        .with_context(|| format!("failed to compute diff vs {base}"))
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
