//! Small JSON documents with create-on-missing, self-healing reads.
//!
//! Reads never fail: a missing or corrupt document yields the caller's
//! fallback. Writes are pretty-printed with a trailing newline and land
//! atomically (temp file + rename). [`update`] wraps a read-modify-write in an
//! exclusive OS lock on a sidecar `<file>.lock`, so cooperating processes do
//! not interleave their updates.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Whether an [`update`] closure changed the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    Write,
    Skip,
}

/// Load `path`, or `fallback()` if it is missing or does not parse.
pub fn read_or<T: DeserializeOwned>(path: &Path, fallback: impl FnOnce() -> T) -> T {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %path.display(), err = %err, "document unreadable, using fallback");
            return fallback();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "document corrupt, treating as empty");
            fallback()
        }
    }
}

/// Serialize `value` to pretty JSON with trailing newline and replace `path` atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Read-modify-write `path` while holding its sidecar lock.
///
/// The document is only rewritten when `apply` returns [`Persist::Write`].
pub fn update<T, R>(
    path: &Path,
    fallback: impl FnOnce() -> T,
    apply: impl FnOnce(&mut T) -> (R, Persist),
) -> Result<R>
where
    T: Serialize + DeserializeOwned,
{
    let _guard = lock_exclusive(path)?;
    let mut doc = read_or(path, fallback);
    let (result, persist) = apply(&mut doc);
    if persist == Persist::Write {
        write_json(path, &doc)?;
    }
    Ok(result)
}

/// Held for the duration of a critical section; unlocked on drop.
#[derive(Debug)]
struct SidecarLock {
    file: File,
}

impl Drop for SidecarLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(err = %err, "failed to unlock sidecar lock");
        }
    }
}

fn lock_exclusive(path: &Path) -> Result<SidecarLock> {
    ensure_parent(path)?;
    let lock_path = sidecar_path(path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("open lock file {}", lock_path.display()))?;
    FileExt::lock_exclusive(&file)
        .with_context(|| format!("lock {}", lock_path.display()))?;
    Ok(SidecarLock { file })
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("document"));
    name.push(".lock");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    ensure_parent(path)?;
    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))
}
