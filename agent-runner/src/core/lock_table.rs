//! Pure transitions over the advisory [`LockTable`].
//!
//! An entry is live while `expiresAt` is in the future. A missing or
//! unparsable `expiresAt` counts as expired, so a damaged entry never blocks
//! the executor forever.

use chrono::{DateTime, Duration, Utc};

use crate::core::types::{LockEntry, LockTable, format_timestamp, parse_timestamp};

/// Result of [`try_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// The caller now holds the lock.
    Acquired { expires_at: String },
    /// A live entry owned by someone else blocks the caller.
    Held {
        holder: String,
        expires_at: Option<String>,
    },
}

/// TTLs below one minute are raised to one minute.
pub fn clamp_ttl_minutes(ttl_minutes: u32) -> u32 {
    ttl_minutes.max(1)
}

/// True if `entry` has a parsable expiry strictly after `now`.
pub fn is_live(entry: &LockEntry, now: DateTime<Utc>) -> bool {
    entry
        .expires_at
        .as_deref()
        .and_then(parse_timestamp)
        .is_some_and(|expires_at| expires_at > now)
}

/// Take `key` for `holder` unless a live entry exists and `force` is off.
///
/// Absent, expired and forced cases all overwrite the entry.
pub fn try_acquire(
    table: &mut LockTable,
    key: &str,
    holder: &str,
    ttl_minutes: u32,
    force: bool,
    now: DateTime<Utc>,
) -> Acquire {
    if let Some(existing) = table.locks.get(key)
        && is_live(existing, now)
        && !force
    {
        return Acquire::Held {
            holder: existing.holder.clone(),
            expires_at: existing.expires_at.clone(),
        };
    }

    let expires_at = format_timestamp(expiry(now, ttl_minutes));
    table.locks.insert(
        key.to_string(),
        LockEntry {
            holder: holder.to_string(),
            acquired_at: Some(format_timestamp(now)),
            expires_at: Some(expires_at.clone()),
        },
    );
    Acquire::Acquired { expires_at }
}

/// Remove `key` only if `holder` still owns it. Returns whether anything changed.
pub fn release(table: &mut LockTable, key: &str, holder: &str) -> bool {
    match table.locks.get(key) {
        Some(existing) if existing.holder == holder => {
            table.locks.remove(key);
            true
        }
        _ => false,
    }
}

/// Push the expiry of `holder`'s own entry to `now + ttl`.
///
/// Returns the new expiry, or `None` if the entry is gone or owned by someone
/// else (a renewal never takes a lock over).
pub fn renew(
    table: &mut LockTable,
    key: &str,
    holder: &str,
    ttl_minutes: u32,
    now: DateTime<Utc>,
) -> Option<String> {
    let entry = table.locks.get_mut(key)?;
    if entry.holder != holder {
        return None;
    }
    let expires_at = format_timestamp(expiry(now, ttl_minutes));
    entry.expires_at = Some(expires_at.clone());
    Some(expires_at)
}

fn expiry(now: DateTime<Utc>, ttl_minutes: u32) -> DateTime<Utc> {
    now + Duration::minutes(i64::from(clamp_ttl_minutes(ttl_minutes)))
}
