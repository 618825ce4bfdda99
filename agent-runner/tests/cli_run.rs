//! CLI tests: spawn the binary against a fixture repository with fake
//! provider executables and check exit codes, stdout plan and state files.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use agent_runner::core::provider::Provider;
use agent_runner::core::types::OrchestratorState;
use agent_runner::exit_codes;
use agent_runner::io::config::{RunnerConfig, write_config};
use agent_runner::io::json_store::read_or;
use agent_runner::io::lock::{EXECUTOR_LOCK_KEY, LockManager};
use agent_runner::io::paths::StatePaths;
use agent_runner::test_support::{TestRepo, write_script};
use serde_json::Value;
use tempfile::TempDir;

struct Cli {
    repo: TestRepo,
    scratch: TempDir,
    paths: StatePaths,
}

impl Cli {
    /// Fixture whose fake `codex` runs `body`.
    fn with_codex(body: &str) -> Self {
        let repo = TestRepo::new().expect("repo");
        let scratch = tempfile::tempdir().expect("scratch");
        let bin = scratch.path().join("bin");
        write_script(&bin, "codex", body).expect("fake codex");

        let paths = StatePaths::new(scratch.path().join("state"));
        let config = RunnerConfig {
            shell: vec!["sh".to_string(), "-c".to_string()],
            extra_path: vec![bin],
            worktree_root: Some(scratch.path().join("trees")),
            ..RunnerConfig::default()
        };
        write_config(&paths.config_path, &config).expect("config");
        Self {
            repo,
            scratch,
            paths,
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_agent-runner"))
            .current_dir(self.repo.path())
            .arg("--state-dir")
            .arg(&self.paths.state_dir)
            .args(args)
            .output()
            .expect("spawn agent-runner")
    }

    fn state(&self) -> OrchestratorState {
        read_or(&self.paths.state_path, OrchestratorState::default)
    }

    fn worktree_root(&self) -> PathBuf {
        self.scratch.path().join("trees")
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn dry_run_prints_json_plan() {
    let cli = Cli::with_codex("exit 0");
    let output = cli.run(&[
        "run",
        "--task",
        "Fix flaky test",
        "--provider",
        "codex",
        "--no-worktree",
        "--dry-run",
    ]);

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    let plan: Value = serde_json::from_slice(&output.stdout).expect("json plan");
    assert_eq!(plan["ok"], true);
    assert_eq!(plan["provider"], "codex");
    assert_eq!(plan["mode"], "implement");
    assert_eq!(plan["baseRef"], "main");
    assert_eq!(plan["dryRun"], true);
    assert_eq!(plan["branch"], Value::Null);
    assert_eq!(plan["runId"].as_str().map(str::len), Some(8));
    assert!(
        plan["command"]
            .as_str()
            .expect("command")
            .contains("Task: Fix flaky test")
    );
    assert!(cli.state().runs.is_empty());
}

#[test]
fn successful_run_executes_agent_in_worktree() {
    let cli = Cli::with_codex("touch agent-ran");
    let output = cli.run(&["run", "-t", "Add health endpoint", "--provider", "codex"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    let plan: Value = serde_json::from_slice(&output.stdout).expect("json plan");
    let cwd = Path::new(plan["cwd"].as_str().expect("cwd"));
    assert!(cwd.starts_with(cli.worktree_root()));
    assert!(cwd.join("agent-ran").is_file());
    assert!(!cli.repo.path().join("agent-ran").exists());

    let state = cli.state();
    assert_eq!(state.runs.len(), 1);
    assert_eq!(state.runs[0].task, "Add health endpoint");
    assert!(
        !LockManager::new(&cli.paths.lock_path)
            .load()
            .locks
            .contains_key(EXECUTOR_LOCK_KEY)
    );
}

#[test]
fn rate_limited_agent_exits_two_and_schedules_cooldown() {
    let cli = Cli::with_codex("echo 'Error: Too Many Requests' >&2\nexit 1");
    let output = cli.run(&["run", "-t", "Anything", "--provider", "codex"]);

    assert_eq!(output.status.code(), Some(exit_codes::RATE_LIMITED));
    assert!(stderr(&output).contains("cooling down for 15 minutes"));
    let codex = cli.state().provider(Provider::Codex).cloned().expect("codex");
    assert_eq!(codex.cooldown_minutes, Some(15));
    assert!(codex.cooldown_until.is_some());

    let output = cli.run(&["run", "-t", "Anything", "--provider", "codex"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&output).contains("codex: cooldown until"));
}

#[test]
fn agent_exit_code_is_propagated() {
    let cli = Cli::with_codex("echo 'assertion failed' >&2\nexit 5");
    let output = cli.run(&["run", "-t", "Anything", "--provider", "codex"]);

    assert_eq!(output.status.code(), Some(5));
    assert!(stderr(&output).contains("assertion failed"));
    let codex = cli.state().provider(Provider::Codex).cloned().unwrap_or_default();
    assert_eq!(codex.cooldown_until, None);
}

#[test]
fn provider_exit_two_is_not_reported_as_rate_limit() {
    let cli = Cli::with_codex("echo 'usage: bad flag' >&2\nexit 2");
    let output = cli.run(&["run", "-t", "Anything", "--provider", "codex"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&output).contains("provider codex exited with code 2"));
    let codex = cli.state().provider(Provider::Codex).cloned().unwrap_or_default();
    assert_eq!(codex.cooldown_minutes, None);
}

#[test]
fn held_lock_exits_invalid() {
    let cli = Cli::with_codex("exit 0");
    let guard = LockManager::new(&cli.paths.lock_path)
        .try_acquire(EXECUTOR_LOCK_KEY, "4242:beef00", 120, false)
        .expect("acquire");
    std::mem::forget(guard);

    let output = cli.run(&["run", "-t", "Anything", "--provider", "codex"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let err = stderr(&output);
    assert!(err.contains("another executor is running"));
    assert!(err.contains("4242:beef00"));
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_task_and_bad_flags_exit_invalid() {
    let cli = Cli::with_codex("exit 0");

    let output = cli.run(&["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&output).contains("missing task"));

    let output = cli.run(&["run", "-t", "x", "--provider", "gpt"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn status_reports_lock_and_runs() {
    let cli = Cli::with_codex("exit 0");
    let output = cli.run(&["run", "-t", "First task", "--provider", "codex", "--no-worktree"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));

    let output = cli.run(&["status"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("executor lock: free"));
    assert!(text.contains("- codex: ready"));
    assert!(text.contains("First task"));
}
