//! Orchestration for a single agent run.
//!
//! A run moves through lock acquisition (implement mode only), provider
//! selection, workspace provisioning, prompt build and execution, and ends in
//! one of the [`RunOutcome`] variants. The executor lock is held by a
//! [`LockGuard`], so every exit path (including early `?` returns) releases it
//! exactly once.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::backoff::{Cooldown, is_rate_limited};
use crate::core::naming::{default_branch, workdir_name};
use crate::core::provider::Provider;
use crate::core::selector::select_provider;
use crate::core::types::{BaseRef, Mode, RunRecord, format_timestamp};
use crate::exit_codes;
use crate::io::config::RunnerConfig;
use crate::io::executor::{ExecRequest, Executor};
use crate::io::git::Git;
use crate::io::lock::{EXECUTOR_LOCK_KEY, LockGuard, LockManager};
use crate::io::paths::StatePaths;
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::provider::{ProviderResolver, prepare_workspace};
use crate::io::state_store::StateStore;
use crate::io::workspace::{ensure_workspace, resolve_base_ref, review_diff};

/// Operator input for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub task: String,
    /// Force a single provider instead of the configured fallback order.
    pub provider: Option<Provider>,
    pub mode: Mode,
    /// Branch name; defaults to `feat/<slug>-<run id>`.
    pub branch: Option<String>,
    /// Worktree directory; defaults to `<worktree_root>/<prefix><branch>`.
    pub workdir: Option<PathBuf>,
    pub base: BaseRef,
    /// Run in the repository root instead of a provisioned worktree.
    pub no_worktree: bool,
    pub notes: Option<String>,
    /// Base to diff against for review-mode prompts.
    pub review_diff: Option<BaseRef>,
    /// Take the executor lock even if it is live.
    pub force: bool,
    pub lock_ttl_minutes: Option<u32>,
    pub dry_run: bool,
}

impl RunRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            provider: None,
            mode: Mode::Implement,
            branch: None,
            workdir: None,
            base: BaseRef::Auto,
            no_worktree: false,
            notes: None,
            review_diff: None,
            force: false,
            lock_ttl_minutes: None,
            dry_run: false,
        }
    }
}

/// Everything decided before the agent starts; printed as JSON for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    pub ok: bool,
    pub run_id: String,
    pub provider: Provider,
    pub mode: Mode,
    pub cwd: PathBuf,
    pub branch: Option<String>,
    pub base_ref: String,
    pub command: String,
    pub dry_run: bool,
}

/// Terminal state of a run that got as far as a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Plan printed, nothing executed.
    DryRun(RunPlan),
    /// Agent exited 0.
    Succeeded(RunPlan),
    /// Agent failed with throttling text on stderr; provider is cooling down.
    RateLimited { plan: RunPlan, cooldown: Cooldown },
    /// Agent failed for any other reason.
    Failed {
        plan: RunPlan,
        exit_code: Option<i32>,
    },
}

impl RunOutcome {
    pub fn plan(&self) -> &RunPlan {
        match self {
            RunOutcome::DryRun(plan) | RunOutcome::Succeeded(plan) => plan,
            RunOutcome::RateLimited { plan, .. } | RunOutcome::Failed { plan, .. } => plan,
        }
    }

    /// Process exit code for this outcome.
    ///
    /// A provider's own failure code is passed through, except `2`, which is
    /// reported as [`exit_codes::INVALID`] so that `2` always means "rate-limited".
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::DryRun(_) | RunOutcome::Succeeded(_) => exit_codes::OK,
            RunOutcome::RateLimited { .. } => exit_codes::RATE_LIMITED,
            RunOutcome::Failed { exit_code, .. } => match exit_code {
                Some(code) if *code != 0 && *code != exit_codes::RATE_LIMITED => *code,
                _ => exit_codes::INVALID,
            },
        }
    }
}

/// Collaborators for [`run_agent`].
pub struct RunEnv<'a, E, R> {
    /// Repository root (the primary checkout).
    pub root: &'a Path,
    pub paths: &'a StatePaths,
    pub config: &'a RunnerConfig,
    pub executor: &'a E,
    pub resolver: &'a R,
}

/// Execute one run end to end.
///
/// Configuration, contention, availability and provisioning failures are
/// returned as errors (typed where the caller may want to react:
/// [`crate::io::lock::LockHeldError`],
/// [`crate::core::selector::NoProviderAvailableError`]). Agent failures are
/// outcomes, not errors. `on_plan` is called once the plan is final and
/// before anything is executed.
#[instrument(skip_all, fields(mode = %request.mode, dry_run = request.dry_run))]
pub fn run_agent<E: Executor, R: ProviderResolver, F: FnMut(&RunPlan)>(
    env: &RunEnv<'_, E, R>,
    request: &RunRequest,
    mut on_plan: F,
) -> Result<RunOutcome> {
    let task = request.task.trim();
    if task.is_empty() {
        bail!("missing task (use --task \"...\")");
    }

    let run_id = random_hex(4);
    let holder = format!("{}:{}", std::process::id(), random_hex(3));

    let mut lock = match request.mode {
        Mode::Implement => {
            let ttl = request
                .lock_ttl_minutes
                .unwrap_or(env.config.lock_ttl_minutes);
            let manager = LockManager::new(&env.paths.lock_path);
            Some(manager.try_acquire(EXECUTOR_LOCK_KEY, &holder, ttl, request.force)?)
        }
        Mode::Review => None,
    };

    let store = StateStore::new(&env.paths.state_path);
    let state = store.load();
    let candidates = match request.provider {
        Some(provider) => vec![provider],
        None => env.config.providers.clone(),
    };
    let provider = select_provider(&candidates, &state, Utc::now(), |provider| {
        env.resolver.is_installed(provider)
    })?;
    info!(provider = %provider, run_id = %run_id, "provider selected");

    let root_git = Git::new(env.root);
    let base_ref = resolve_base_ref(&root_git, &request.base, &env.config.base_candidates)?;
    let branch = request
        .branch
        .clone()
        .unwrap_or_else(|| default_branch(task, &run_id));
    let workdir = match &request.workdir {
        Some(dir) if dir.is_relative() => env.root.join(dir),
        Some(dir) => dir.clone(),
        None => env
            .config
            .worktree_root()
            .join(workdir_name(&env.config.worktree_prefix, &branch)),
    };
    let cwd = if request.no_worktree {
        env.root.to_path_buf()
    } else {
        workdir.clone()
    };

    if !request.no_worktree && !request.dry_run {
        ensure_workspace(&root_git, &branch, &workdir, &base_ref)?;
    }

    let diff = review_diff_for(env, request, &cwd)?;
    let prompt = PromptBuilder::new(env.config.test_command.as_str())?.build(&PromptInputs {
        task: task.to_string(),
        mode: request.mode,
        notes: request.notes.clone(),
        review_diff: diff,
    })?;
    let command_line = provider.invocation(&prompt, request.mode).command_line();

    let plan = RunPlan {
        ok: true,
        run_id: run_id.clone(),
        provider,
        mode: request.mode,
        cwd: cwd.clone(),
        branch: (!request.no_worktree).then(|| branch.clone()),
        base_ref,
        command: command_line.clone(),
        dry_run: request.dry_run,
    };
    on_plan(&plan);

    if request.dry_run {
        release_lock(lock);
        return Ok(RunOutcome::DryRun(plan));
    }

    prepare_workspace(provider, &cwd)?;
    store.record_run(RunRecord {
        id: run_id,
        at: format_timestamp(Utc::now()),
        provider: provider.name().to_string(),
        mode: request.mode,
        task: task.to_string(),
        branch: plan.branch.clone(),
        workdir: cwd.display().to_string(),
    })?;

    if let Some(guard) = lock.as_mut() {
        guard.keep_alive();
    }
    let exec = env.executor.exec(&ExecRequest { cwd, command_line })?;
    release_lock(lock);

    if exec.success() {
        info!(provider = %provider, "agent run succeeded");
        store.clear_cooldown(provider)?;
        return Ok(RunOutcome::Succeeded(plan));
    }
    if is_rate_limited(&exec.stderr) {
        let cooldown = store.schedule_cooldown(provider, Utc::now())?;
        warn!(provider = %provider, minutes = cooldown.minutes, "agent hit rate limit");
        return Ok(RunOutcome::RateLimited { plan, cooldown });
    }
    warn!(provider = %provider, exit_code = ?exec.exit_code, "agent run failed");
    Ok(RunOutcome::Failed {
        plan,
        exit_code: exec.exit_code,
    })
}

fn review_diff_for<E, R>(
    env: &RunEnv<'_, E, R>,
    request: &RunRequest,
    cwd: &Path,
) -> Result<Option<String>> {
    let Some(preference) = &request.review_diff else {
        return Ok(None);
    };
    if request.mode != Mode::Review {
        warn!("--review-diff only applies to review mode, ignoring");
        return Ok(None);
    }
    if request.dry_run {
        debug!("dry run, review diff not computed");
        return Ok(None);
    }
    let base = resolve_base_ref(
        &Git::new(env.root),
        preference,
        &env.config.base_candidates,
    )?;
    review_diff(cwd, &base).map(Some)
}

fn release_lock(lock: Option<LockGuard>) {
    if let Some(guard) = lock
        && let Err(err) = guard.release()
    {
        warn!(err = %err, "failed to release executor lock");
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> RunPlan {
        RunPlan {
            ok: true,
            run_id: "deadbeef".to_string(),
            provider: Provider::Codex,
            mode: Mode::Implement,
            cwd: PathBuf::from("/tmp/agent-feat-x"),
            branch: Some("feat/x".to_string()),
            base_ref: "main".to_string(),
            command: "codex exec x".to_string(),
            dry_run: false,
        }
    }

    #[test]
    fn exit_codes_follow_outcome() {
        assert_eq!(RunOutcome::Succeeded(plan()).exit_code(), exit_codes::OK);
        assert_eq!(RunOutcome::DryRun(plan()).exit_code(), exit_codes::OK);
        assert_eq!(
            RunOutcome::RateLimited {
                plan: plan(),
                cooldown: Cooldown {
                    minutes: 15,
                    until: "2026-03-01T12:15:00.000Z".to_string(),
                },
            }
            .exit_code(),
            exit_codes::RATE_LIMITED
        );
        assert_eq!(
            RunOutcome::Failed {
                plan: plan(),
                exit_code: Some(42)
            }
            .exit_code(),
            42
        );
        assert_eq!(
            RunOutcome::Failed {
                plan: plan(),
                exit_code: None
            }
            .exit_code(),
            exit_codes::INVALID
        );
    }

    #[test]
    fn provider_exit_two_does_not_masquerade_as_rate_limit() {
        let outcome = RunOutcome::Failed {
            plan: plan(),
            exit_code: Some(exit_codes::RATE_LIMITED),
        };
        assert_eq!(outcome.exit_code(), exit_codes::INVALID);
    }

    #[test]
    fn plan_serializes_camel_case() {
        let json = serde_json::to_value(plan()).expect("serialize");
        assert_eq!(json["runId"], "deadbeef");
        assert_eq!(json["provider"], "codex");
        assert_eq!(json["mode"], "implement");
        assert_eq!(json["baseRef"], "main");
        assert_eq!(json["dryRun"], false);
    }

    #[test]
    fn random_hex_has_expected_length() {
        let id = random_hex(4);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
