//! Persisted documents and shared value types.
//!
//! Both documents tolerate missing fields so that hand-edited or partially
//! written files still load; timestamps are kept as strings because an
//! unparsable timestamp has defined semantics (see [`crate::core::lock_table`]
//! and [`crate::core::selector`]) rather than being a load error.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::provider::Provider;

/// Current on-disk schema version for both documents.
pub const DOCUMENT_VERSION: u32 = 1;

/// Maximum number of run records kept in [`OrchestratorState::runs`].
pub const RUN_HISTORY_LIMIT: usize = 50;

/// What the agent is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Implement end-to-end; takes the executor lock.
    #[default]
    Implement,
    /// Review only; runs without the executor lock.
    Review,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Implement => "implement",
            Mode::Review => "review",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base reference preference: probe for the integration branch, or use a ref as given.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BaseRef {
    #[default]
    Auto,
    Explicit(String),
}

impl FromStr for BaseRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("base reference must not be empty".to_string());
        }
        if trimmed == "auto" {
            Ok(BaseRef::Auto)
        } else {
            Ok(BaseRef::Explicit(trimmed.to_string()))
        }
    }
}

/// `lock.json`: named advisory locks with expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTable {
    #[serde(default = "document_version")]
    pub version: u32,
    #[serde(default)]
    pub locks: BTreeMap<String, LockEntry>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            locks: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    #[serde(default)]
    pub holder: String,
    #[serde(default)]
    pub acquired_at: Option<String>,
    /// Missing or unparsable means already expired.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// `state.json`: provider cooldowns and bounded run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorState {
    #[serde(default = "document_version")]
    pub version: u32,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderStatus>,
    /// Most recent first, at most [`RUN_HISTORY_LIMIT`] entries.
    #[serde(default)]
    pub runs: Vec<RunRecord>,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            providers: Provider::ALL
                .iter()
                .map(|provider| (provider.name().to_string(), ProviderStatus::default()))
                .collect(),
            runs: Vec::new(),
        }
    }
}

impl OrchestratorState {
    pub fn provider(&self, provider: Provider) -> Option<&ProviderStatus> {
        self.providers.get(provider.name())
    }

    pub fn provider_mut(&mut self, provider: Provider) -> &mut ProviderStatus {
        self.providers
            .entry(provider.name().to_string())
            .or_default()
    }

    /// Prepend a run record, evicting the oldest entries beyond the history limit.
    pub fn push_run(&mut self, record: RunRecord) {
        self.runs.insert(0, record);
        self.runs.truncate(RUN_HISTORY_LIMIT);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    #[serde(default)]
    pub cooldown_until: Option<String>,
    /// Length of the last cooldown applied, used to pick the next backoff rung.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub at: String,
    pub provider: String,
    pub mode: Mode,
    pub task: String,
    pub branch: Option<String>,
    pub workdir: String,
}

fn document_version() -> u32 {
    DOCUMENT_VERSION
}

/// Format a timestamp the way both documents store it (`2026-01-02T03:04:05.678Z`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp; `None` for anything that is not RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
