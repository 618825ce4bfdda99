//! Runner configuration stored under `.agent-runner/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::provider::Provider;

/// Runner configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults
/// below, and a missing file means "all defaults".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Candidate order when no provider is forced on the command line.
    pub providers: Vec<Provider>,

    /// Integration branch names probed, in order, when the base ref is `auto`.
    pub base_candidates: Vec<String>,

    /// Executor lock TTL in minutes (overridden by `--lock-ttl-min`).
    pub lock_ttl_minutes: u32,

    /// Shell argv prefix; the provider command line is appended as the last argument.
    pub shell: Vec<String>,

    /// Directories prepended to `PATH` for provider lookup and the agent process.
    pub extra_path: Vec<PathBuf>,

    /// Parent directory for provisioned working trees (defaults to the OS temp dir).
    pub worktree_root: Option<PathBuf>,

    /// Prefix for provisioned working tree directory names.
    pub worktree_prefix: String,

    /// Test command the agent is told to run.
    pub test_command: String,

    /// Keep at most this many trailing bytes of agent stderr for classification.
    ///
    /// Throttling text that scrolls out of this tail is missed, and the failure
    /// is classified as an ordinary one.
    pub stderr_capture_limit_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            providers: Provider::ALL.to_vec(),
            base_candidates: vec!["main".to_string(), "master".to_string()],
            lock_ttl_minutes: 120,
            shell: vec!["bash".to_string(), "-lc".to_string()],
            extra_path: Vec::new(),
            worktree_root: None,
            worktree_prefix: "agent-".to_string(),
            test_command: "npm test".to_string(),
            stderr_capture_limit_bytes: 1_000_000,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(anyhow!("providers must list at least one provider"));
        }
        if self.lock_ttl_minutes == 0 {
            return Err(anyhow!("lock_ttl_minutes must be > 0"));
        }
        if self.shell.is_empty() || self.shell[0].trim().is_empty() {
            return Err(anyhow!("shell must be a non-empty array"));
        }
        if self.stderr_capture_limit_bytes == 0 {
            return Err(anyhow!("stderr_capture_limit_bytes must be > 0"));
        }
        if self.test_command.trim().is_empty() {
            return Err(anyhow!("test_command must not be empty"));
        }
        Ok(())
    }

    pub fn worktree_root(&self) -> PathBuf {
        self.worktree_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
