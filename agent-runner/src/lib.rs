//! Single-entry orchestrator for coding-agent CLIs.
//!
//! One command takes a task, picks an available agent CLI (codex, claude,
//! gemini) honoring per-provider rate-limit cooldowns, provisions an isolated
//! git worktree, builds a standardized brief, and runs the agent with an
//! exclusive executor lock so only one implementing agent runs per repository.
//!
//! - **[`core`]**: Pure, deterministic logic (lock table, cooldown ladder,
//!   provider selection, naming). No I/O.
//! - **[`io`]**: Side-effecting operations (JSON stores, git, process
//!   execution, provider discovery).
//!
//! [`orchestrator`] composes the two into a run; [`status`] reports the
//! persisted lock and provider state.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
