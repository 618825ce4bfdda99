//! Rate-limit classification and cooldown escalation.

use chrono::{DateTime, Duration, Utc};

use crate::core::types::{ProviderStatus, format_timestamp};

/// Cooldown ladder in minutes. Escalation stops at the last rung.
pub const BACKOFF_LADDER: [u32; 4] = [15, 30, 60, 120];

const RATE_LIMIT_MARKERS: [&str; 7] = [
    "rate limit",
    "rate-limit",
    "ratelimit",
    "429",
    "too many requests",
    "try again later",
    "temporarily unavailable",
];

/// Case-insensitive match of agent stderr against known throttling phrases.
pub fn is_rate_limited(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Next rung strictly above `previous`, starting at the first rung.
pub fn next_backoff_minutes(previous: Option<u32>) -> u32 {
    let last = BACKOFF_LADDER[BACKOFF_LADDER.len() - 1];
    match previous {
        None => BACKOFF_LADDER[0],
        Some(previous) => BACKOFF_LADDER
            .iter()
            .copied()
            .find(|rung| *rung > previous)
            .unwrap_or(last),
    }
}

/// A cooldown decided for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cooldown {
    pub minutes: u32,
    pub until: String,
}

/// Escalate `status` after a rate-limited failure observed at `now`.
pub fn schedule_cooldown(status: &mut ProviderStatus, now: DateTime<Utc>) -> Cooldown {
    let minutes = next_backoff_minutes(status.cooldown_minutes);
    let until = format_timestamp(now + Duration::minutes(i64::from(minutes)));
    status.cooldown_until = Some(until.clone());
    status.cooldown_minutes = Some(minutes);
    Cooldown { minutes, until }
}

/// Forget any cooldown after the provider completed a run.
pub fn reset_cooldown(status: &mut ProviderStatus) {
    status.cooldown_until = None;
    status.cooldown_minutes = None;
}
