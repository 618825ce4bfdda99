//! I/O helpers for agent runs.

pub mod config;
pub mod executor;
pub mod git;
pub mod json_store;
pub mod lock;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod state_store;
pub mod workspace;
