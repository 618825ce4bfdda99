//! Single-entry orchestrator for coding-agent CLIs.
//!
//! `agent-runner run` picks an available agent (codex, claude, gemini),
//! provisions a git worktree, and runs the agent with a standardized brief
//! while holding the repository's executor lock. `agent-runner status` shows
//! the lock, provider cooldowns and recent runs.

use std::path::{Path, PathBuf};

use agent_runner::core::provider::Provider;
use agent_runner::core::types::{BaseRef, Mode};
use agent_runner::exit_codes;
use agent_runner::io::config::load_config;
use agent_runner::io::executor::ShellExecutor;
use agent_runner::io::paths::StatePaths;
use agent_runner::io::provider::{SearchPathResolver, search_path};
use agent_runner::logging;
use agent_runner::orchestrator::{RunEnv, RunOutcome, RunPlan, RunRequest, run_agent};
use agent_runner::status::{DEFAULT_RUN_LIMIT, render, status_report};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "agent-runner",
    version,
    about = "Run one coding-agent CLI per task with locking, cooldowns and worktrees"
)]
struct Cli {
    /// State directory (default: `.agent-runner` in the current directory).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Select a provider, provision a worktree and run the agent on a task.
    Run(RunArgs),
    /// Show the executor lock, provider cooldowns and recent runs.
    Status {
        /// Number of recent runs to show.
        #[arg(long, default_value_t = DEFAULT_RUN_LIMIT)]
        limit: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// What the agent should do.
    #[arg(short, long)]
    task: Option<String>,

    /// Use only this provider instead of the configured fallback order.
    #[arg(long, value_enum)]
    provider: Option<Provider>,

    #[arg(long, value_enum, default_value_t = Mode::Implement)]
    mode: Mode,

    /// Branch for the worktree (default: `feat/<slug>-<run id>`).
    #[arg(long)]
    branch: Option<String>,

    /// Worktree directory (default: derived from the branch under the worktree root).
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Base ref for a new branch: `auto` probes the configured candidates, then `HEAD`.
    #[arg(long, default_value = "auto")]
    base: BaseRef,

    /// Run in the current directory instead of a provisioned worktree.
    #[arg(long)]
    no_worktree: bool,

    /// Extra context appended to the brief.
    #[arg(long)]
    notes: Option<String>,

    /// Include `git diff <base>..HEAD` in a review brief (`auto` or a ref).
    #[arg(long)]
    review_diff: Option<BaseRef>,

    /// Take the executor lock even if another run holds it.
    #[arg(long)]
    force: bool,

    /// Executor lock TTL in minutes (default from config).
    #[arg(long = "lock-ttl-min")]
    lock_ttl_min: Option<u32>,

    /// Print the plan without provisioning or running anything.
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn into_request(self) -> RunRequest {
        RunRequest {
            task: self.task.unwrap_or_default(),
            provider: self.provider,
            mode: self.mode,
            branch: self.branch,
            workdir: self.workdir,
            base: self.base,
            no_worktree: self.no_worktree,
            notes: self.notes,
            review_diff: self.review_diff,
            force: self.force,
            lock_ttl_minutes: self.lock_ttl_min,
            dry_run: self.dry_run,
        }
    }
}

fn main() {
    logging::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // `--help` and `--version` go through here too.
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let paths = match &cli.state_dir {
        Some(dir) => StatePaths::new(dir),
        None => StatePaths::for_root(&root),
    };
    match cli.command {
        Command::Run(args) => cmd_run(&root, &paths, args),
        Command::Status { limit } => cmd_status(&paths, limit),
    }
}

fn cmd_run(root: &Path, paths: &StatePaths, args: RunArgs) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let search_path = search_path(&config.extra_path)?;
    let resolver = SearchPathResolver::new(search_path.clone(), root);
    let executor = ShellExecutor::new(
        config.shell.clone(),
        search_path,
        config.stderr_capture_limit_bytes,
    );
    let env = RunEnv {
        root,
        paths,
        config: &config,
        executor: &executor,
        resolver: &resolver,
    };

    let mut printed = Ok(());
    let outcome = run_agent(&env, &args.into_request(), |plan| {
        printed = print_plan(plan);
    })?;
    printed?;

    report_outcome(&outcome);
    Ok(outcome.exit_code())
}

fn cmd_status(paths: &StatePaths, limit: usize) -> Result<i32> {
    let report = status_report(paths, limit, Utc::now());
    print!("{}", render(&report));
    Ok(exit_codes::OK)
}

fn print_plan(plan: &RunPlan) -> Result<()> {
    let json = serde_json::to_string_pretty(plan).context("serialize run plan")?;
    println!("{json}");
    Ok(())
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::DryRun(_) | RunOutcome::Succeeded(_) => {}
        RunOutcome::RateLimited { plan, cooldown } => eprintln!(
            "provider {} hit a rate limit; cooling down for {} minutes (until {})",
            plan.provider, cooldown.minutes, cooldown.until
        ),
        RunOutcome::Failed { plan, exit_code } => match exit_code {
            Some(code) => eprintln!("provider {} exited with code {code}", plan.provider),
            None => eprintln!("provider {} was terminated by a signal", plan.provider),
        },
    }
}
