//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples orchestration from actually spawning an
//! agent CLI. Tests use scripted executors that return predetermined exit
//! codes and stderr without spawning processes.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::io::process::run_with_stderr_tee;

/// Parameters for one agent run.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the agent process.
    pub cwd: PathBuf,
    /// Fully escaped provider command line.
    pub command_line: String,
}

/// What the agent process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured stderr tail (lossy UTF-8).
    pub stderr: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run the command line to completion. Errors only when the process
    /// could not be run at all; a non-zero exit is an `Ok` outcome.
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome>;
}

/// Executor that hands the command line to a shell (`bash -lc` by default).
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: Vec<String>,
    search_path: OsString,
    capture_limit_bytes: usize,
}

impl ShellExecutor {
    pub fn new(shell: Vec<String>, search_path: OsString, capture_limit_bytes: usize) -> Self {
        Self {
            shell,
            search_path,
            capture_limit_bytes,
        }
    }
}

impl Executor for ShellExecutor {
    #[instrument(skip_all, fields(cwd = %request.cwd.display()))]
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        let (program, prefix) = self
            .shell
            .split_first()
            .ok_or_else(|| anyhow!("shell command is empty"))?;
        info!(shell = %program, "starting agent");

        let mut cmd = Command::new(program);
        cmd.args(prefix)
            .arg(&request.command_line)
            .current_dir(&request.cwd)
            .env("PATH", &self.search_path);

        let output = run_with_stderr_tee(cmd, self.capture_limit_bytes, std::io::stderr())
            .with_context(|| format!("run agent via {program}"))?;

        let exit_code = output.status.code();
        if exit_code.is_none() {
            warn!("agent terminated by signal");
        }
        Ok(ExecOutcome {
            exit_code,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
