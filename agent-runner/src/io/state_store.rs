//! Provider cooldowns and run history (`.agent-runner/state.json`).

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::backoff::{Cooldown, reset_cooldown, schedule_cooldown};
use crate::core::provider::Provider;
use crate::core::types::{OrchestratorState, RunRecord};
use crate::io::json_store::{Persist, read_or, update};

/// Repository for the orchestrator state document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current state (defaults if missing or corrupt).
    pub fn load(&self) -> OrchestratorState {
        read_or(&self.path, OrchestratorState::default)
    }

    /// Prepend `record` to the bounded run history.
    pub fn record_run(&self, record: RunRecord) -> Result<()> {
        debug!(run_id = %record.id, provider = %record.provider, "recording run");
        update(&self.path, OrchestratorState::default, |state| {
            state.push_run(record);
            ((), Persist::Write)
        })
    }

    /// Escalate `provider`'s cooldown after a rate-limited failure.
    pub fn schedule_cooldown(&self, provider: Provider, now: DateTime<Utc>) -> Result<Cooldown> {
        let cooldown = update(&self.path, OrchestratorState::default, |state| {
            let cooldown = schedule_cooldown(state.provider_mut(provider), now);
            (cooldown, Persist::Write)
        })?;
        info!(provider = %provider, minutes = cooldown.minutes, until = %cooldown.until, "cooldown scheduled");
        Ok(cooldown)
    }

    /// Clear `provider`'s cooldown and backoff ladder after a successful run.
    pub fn clear_cooldown(&self, provider: Provider) -> Result<()> {
        update(&self.path, OrchestratorState::default, |state| {
            let status = state.provider_mut(provider);
            if status.cooldown_until.is_none() && status.cooldown_minutes.is_none() {
                return ((), Persist::Skip);
            }
            reset_cooldown(status);
            ((), Persist::Write)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::core::types::{Mode, RUN_HISTORY_LIMIT};

    fn record(id: &str) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            at: "2026-03-01T12:00:00.000Z".to_string(),
            provider: "claude".to_string(),
            mode: Mode::Review,
            task: "review".to_string(),
            branch: None,
            workdir: "/repo".to_string(),
        }
    }

    #[test]
    fn missing_file_loads_default_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("state.json"));
        assert_eq!(store.load(), OrchestratorState::default());
    }

    #[test]
    fn run_history_is_capped_most_recent_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("state.json"));
        for i in 0..=RUN_HISTORY_LIMIT {
            store.record_run(record(&format!("r{i}"))).expect("record");
        }

        let state = store.load();
        assert_eq!(state.runs.len(), RUN_HISTORY_LIMIT);
        assert_eq!(state.runs[0].id, format!("r{RUN_HISTORY_LIMIT}"));
        assert_eq!(state.runs.last().map(|run| run.id.as_str()), Some("r1"));
    }

    #[test]
    fn repeated_rate_limits_escalate_then_success_resets() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("state.json"));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let minutes: Vec<u32> = (0..5)
            .map(|_| {
                store
                    .schedule_cooldown(Provider::Codex, now)
                    .expect("cooldown")
                    .minutes
            })
            .collect();
        assert_eq!(minutes, vec![15, 30, 60, 120, 120]);

        store.clear_cooldown(Provider::Codex).expect("clear");
        let state = store.load();
        let status = state.provider(Provider::Codex).expect("status");
        assert_eq!(status.cooldown_until, None);
        assert_eq!(status.cooldown_minutes, None);
    }

    #[test]
    fn cooldown_for_one_provider_leaves_others_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(temp.path().join("state.json"));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        store.schedule_cooldown(Provider::Gemini, now).expect("cooldown");
        let state = store.load();
        assert_eq!(
            state
                .provider(Provider::Gemini)
                .and_then(|status| status.cooldown_until.as_deref()),
            Some("2026-03-01T12:15:00.000Z")
        );
        assert_eq!(
            state
                .provider(Provider::Codex)
                .and_then(|status| status.cooldown_until.as_deref()),
            None
        );
    }
}
