//! Provider discovery and provider-local setup.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::debug;

use crate::core::provider::Provider;

/// Resolves provider executables.
pub trait ProviderResolver {
    /// Full path of the provider's executable, if installed.
    fn resolve(&self, provider: Provider) -> Option<PathBuf>;

    fn is_installed(&self, provider: Provider) -> bool {
        self.resolve(provider).is_some()
    }
}

/// Looks executables up on an explicit search path.
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    search_path: OsString,
    cwd: PathBuf,
}

impl SearchPathResolver {
    pub fn new(search_path: OsString, cwd: impl Into<PathBuf>) -> Self {
        Self {
            search_path,
            cwd: cwd.into(),
        }
    }
}

impl ProviderResolver for SearchPathResolver {
    fn resolve(&self, provider: Provider) -> Option<PathBuf> {
        let found = which::which_in(provider.binary(), Some(&self.search_path), &self.cwd).ok();
        debug!(provider = %provider, found = ?found, "resolved provider executable");
        found
    }
}

/// `extra` directories followed by the inherited `PATH`, deduplicated.
pub fn search_path(extra: &[PathBuf]) -> Result<OsString> {
    let inherited = env::var_os("PATH").unwrap_or_default();
    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in extra.iter().cloned().chain(env::split_paths(&inherited)) {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    env::join_paths(dirs).context("build search path")
}

/// Provider-specific preparation of the run's working directory.
///
/// `claude` gets a local settings file allowing shell and file edits inside
/// the workspace, so the session does not stall on permission prompts.
pub fn prepare_workspace(provider: Provider, cwd: &Path) -> Result<()> {
    if provider != Provider::Claude {
        return Ok(());
    }
    let dir = cwd.join(".claude");
    let path = dir.join("settings.local.json");
    let content = json!({
        "permissions": {
            "allow": ["bash:*", "read:**/*", "edit:**/*", "write:**/*"]
        }
    });
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let mut buf = serde_json::to_string_pretty(&content)?;
    buf.push('\n');
    fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), "wrote claude local permissions");
    Ok(())
}
