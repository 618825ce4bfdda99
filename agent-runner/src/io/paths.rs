//! Canonical locations of runner-owned files.

use std::path::{Path, PathBuf};

/// Default state directory name under the repository root.
pub const STATE_DIR_NAME: &str = ".agent-runner";

/// All runner-owned paths for one state directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub state_path: PathBuf,
    pub config_path: PathBuf,
}

impl StatePaths {
    /// Paths under `<root>/.agent-runner/`.
    pub fn for_root(root: &Path) -> Self {
        Self::new(root.join(STATE_DIR_NAME))
    }

    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            lock_path: state_dir.join("lock.json"),
            state_path: state_dir.join("state.json"),
            config_path: state_dir.join("config.toml"),
            state_dir,
        }
    }
}
