//! File-backed advisory lock manager.
//!
//! The lock table lives in a shared JSON document. Every transition is a
//! read-modify-write under the document's sidecar OS lock (see
//! [`crate::io::json_store::update`]); the advisory entry itself is what
//! other runner processes check.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::lock_table::{self, Acquire, clamp_ttl_minutes};
use crate::core::types::LockTable;
use crate::io::json_store::{Persist, read_or, update};

/// Lock key serializing implement-mode runs.
pub const EXECUTOR_LOCK_KEY: &str = "executor";

const MIN_HEARTBEAT: Duration = Duration::from_secs(30);

/// A live lock owned by someone else blocked acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHeldError {
    pub key: String,
    pub holder: String,
    pub expires_at: Option<String>,
}

impl fmt::Display for LockHeldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "another executor is running (locked by {} until {}); use --force to override",
            self.holder,
            self.expires_at.as_deref().unwrap_or("unknown")
        )
    }
}

impl Error for LockHeldError {}

/// Manager for the lock table at one path.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current table (empty if missing or corrupt).
    pub fn load(&self) -> LockTable {
        read_or(&self.path, LockTable::default)
    }

    /// Acquire `key` for `holder`, returning a guard that releases it on drop.
    ///
    /// Fails with [`LockHeldError`] if a live entry exists and `force` is off;
    /// nothing is written in that case.
    #[instrument(skip_all, fields(key = %key, holder = %holder, force))]
    pub fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        ttl_minutes: u32,
        force: bool,
    ) -> Result<LockGuard> {
        let ttl_minutes = clamp_ttl_minutes(ttl_minutes);
        let outcome = update(&self.path, LockTable::default, |table| {
            let outcome =
                lock_table::try_acquire(table, key, holder, ttl_minutes, force, Utc::now());
            let persist = match outcome {
                Acquire::Acquired { .. } => Persist::Write,
                Acquire::Held { .. } => Persist::Skip,
            };
            (outcome, persist)
        })?;

        match outcome {
            Acquire::Acquired { expires_at } => {
                info!(key, holder, expires_at = %expires_at, "lock acquired");
                Ok(LockGuard {
                    manager: self.clone(),
                    key: key.to_string(),
                    holder: holder.to_string(),
                    ttl_minutes,
                    expires_at,
                    released: false,
                    heartbeat: None,
                })
            }
            Acquire::Held { holder, expires_at } => {
                debug!(key, holder = %holder, "lock held by another process");
                Err(LockHeldError {
                    key: key.to_string(),
                    holder,
                    expires_at,
                }
                .into())
            }
        }
    }

    /// Delete `key` if `holder` still owns it. Returns whether an entry was removed.
    pub fn release(&self, key: &str, holder: &str) -> Result<bool> {
        let removed = update(&self.path, LockTable::default, |table| {
            let removed = lock_table::release(table, key, holder);
            let persist = if removed { Persist::Write } else { Persist::Skip };
            (removed, persist)
        })?;
        if removed {
            debug!(key, holder, "lock released");
        } else {
            warn!(key, holder, "lock no longer owned, leaving entry untouched");
        }
        Ok(removed)
    }

    /// Extend `holder`'s own entry. Returns the new expiry if it still owns `key`.
    pub fn renew(&self, key: &str, holder: &str, ttl_minutes: u32) -> Result<Option<String>> {
        update(&self.path, LockTable::default, |table| {
            let renewed = lock_table::renew(table, key, holder, ttl_minutes, Utc::now());
            let persist = if renewed.is_some() {
                Persist::Write
            } else {
                Persist::Skip
            };
            (renewed, persist)
        })
    }
}

/// An acquired lock. Released exactly once: explicitly via [`LockGuard::release`]
/// or on drop.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    key: String,
    holder: String,
    ttl_minutes: u32,
    expires_at: String,
    released: bool,
    heartbeat: Option<Heartbeat>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn expires_at(&self) -> &str {
        &self.expires_at
    }

    /// Renew the entry in the background every `ttl / 2` (at least 30s) until
    /// the guard is released, so a run longer than the TTL keeps its lock.
    pub fn keep_alive(&mut self) {
        let half_ttl = Duration::from_secs(u64::from(self.ttl_minutes) * 60 / 2);
        self.keep_alive_every(half_ttl.max(MIN_HEARTBEAT));
    }

    pub(crate) fn keep_alive_every(&mut self, interval: Duration) {
        if self.heartbeat.is_some() || self.released {
            return;
        }
        self.heartbeat = Some(Heartbeat::spawn(
            self.manager.clone(),
            self.key.clone(),
            self.holder.clone(),
            self.ttl_minutes,
            interval,
        ));
    }

    #[cfg(test)]
    fn heartbeat_finished(&self) -> Option<bool> {
        self.heartbeat
            .as_ref()
            .map(|heartbeat| heartbeat.handle.is_finished())
    }

    /// Release now and report whether the entry was still ours.
    pub fn release(mut self) -> Result<bool> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<bool> {
        if self.released {
            return Ok(false);
        }
        self.released = true;
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.manager.release(&self.key, &self.holder)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            warn!(key = %self.key, err = %err, "failed to release lock");
        }
    }
}

/// Background renewal thread for one lock entry.
#[derive(Debug)]
struct Heartbeat {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    fn spawn(
        manager: LockManager,
        key: String,
        holder: String,
        ttl_minutes: u32,
        interval: Duration,
    ) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                match manager.renew(&key, &holder, ttl_minutes) {
                    Ok(Some(expires_at)) => debug!(key = %key, expires_at = %expires_at, "lock renewed"),
                    Ok(None) => {
                        warn!(key = %key, holder = %holder, "lock taken over, heartbeat stopped");
                        break;
                    }
                    Err(err) => warn!(key = %key, err = %err, "lock renewal failed"),
                }
            }
        });
        Self { stop, handle }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("lock heartbeat thread panicked");
        }
    }
}
