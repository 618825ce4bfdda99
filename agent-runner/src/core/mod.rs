//! Deterministic, pure logic shared by the agent runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! documents and take the current time as an argument, so every decision
//! (lock contention, provider selection, backoff) is reproducible in tests.

pub mod backoff;
pub mod lock_table;
pub mod naming;
pub mod provider;
pub mod selector;
pub mod types;
