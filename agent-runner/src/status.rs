//! `agent-runner status`: executor lock, provider availability and recent runs.

use chrono::{DateTime, Utc};

use crate::core::lock_table::is_live;
use crate::core::provider::Provider;
use crate::core::selector::active_cooldown;
use crate::core::types::RunRecord;
use crate::io::lock::{EXECUTOR_LOCK_KEY, LockManager};
use crate::io::paths::StatePaths;
use crate::io::state_store::StateStore;

pub const DEFAULT_RUN_LIMIT: usize = 10;

/// Executor lock as recorded on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub holder: String,
    pub expires_at: Option<String>,
    /// False once the entry has expired; the next acquire reclaims it.
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready,
    CoolingDown { until: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub lock: Option<LockStatus>,
    pub providers: Vec<(Provider, Availability)>,
    /// Newest first.
    pub runs: Vec<RunRecord>,
}

/// Read the lock table and state document without modifying either.
pub fn status_report(paths: &StatePaths, run_limit: usize, now: DateTime<Utc>) -> StatusReport {
    let table = LockManager::new(&paths.lock_path).load();
    let lock = table.locks.get(EXECUTOR_LOCK_KEY).map(|entry| LockStatus {
        holder: entry.holder.clone(),
        expires_at: entry.expires_at.clone(),
        live: is_live(entry, now),
    });

    let state = StateStore::new(&paths.state_path).load();
    let providers = Provider::ALL
        .iter()
        .map(|&provider| {
            let availability = match active_cooldown(&state, provider, now) {
                Some(until) => Availability::CoolingDown { until },
                None => Availability::Ready,
            };
            (provider, availability)
        })
        .collect();
    let runs = state.runs.into_iter().take(run_limit).collect();

    StatusReport {
        lock,
        providers,
        runs,
    }
}

/// Human-readable rendering, one line per fact.
pub fn render(report: &StatusReport) -> String {
    let mut out = String::new();
    match &report.lock {
        Some(lock) if lock.live => out.push_str(&format!(
            "executor lock: held by {} until {}\n",
            lock.holder,
            lock.expires_at.as_deref().unwrap_or("unknown")
        )),
        Some(lock) => out.push_str(&format!(
            "executor lock: expired (last holder {})\n",
            lock.holder
        )),
        None => out.push_str("executor lock: free\n"),
    }

    out.push_str("providers:\n");
    for (provider, availability) in &report.providers {
        match availability {
            Availability::Ready => out.push_str(&format!("- {provider}: ready\n")),
            Availability::CoolingDown { until } => {
                out.push_str(&format!("- {provider}: cooldown until {until}\n"));
            }
        }
    }

    if report.runs.is_empty() {
        out.push_str("runs: none\n");
        return out;
    }
    out.push_str("runs:\n");
    for run in &report.runs {
        out.push_str(&format!(
            "- {} {} {} {} [{}] {}\n",
            run.at,
            run.id,
            run.provider,
            run.mode,
            run.branch.as_deref().unwrap_or("-"),
            run.task
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Mode, format_timestamp};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn record(id: &str) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            at: format_timestamp(now()),
            provider: "codex".to_string(),
            mode: Mode::Implement,
            task: format!("task {id}"),
            branch: Some(format!("feat/task-{id}")),
            workdir: format!("/tmp/agent-feat-task-{id}"),
        }
    }

    #[test]
    fn empty_state_reports_free_lock_and_ready_providers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::for_root(temp.path());

        let report = status_report(&paths, DEFAULT_RUN_LIMIT, now());
        assert_eq!(report.lock, None);
        assert!(
            report
                .providers
                .iter()
                .all(|(_, availability)| *availability == Availability::Ready)
        );
        let text = render(&report);
        assert!(text.contains("executor lock: free"));
        assert!(text.contains("- gemini: ready"));
        assert!(text.contains("runs: none"));
    }

    #[test]
    fn reports_live_lock_cooldown_and_limited_runs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::for_root(temp.path());

        let guard = LockManager::new(&paths.lock_path)
            .try_acquire(EXECUTOR_LOCK_KEY, "42:abcdef", 120, false)
            .expect("acquire");
        std::mem::forget(guard);

        let store = StateStore::new(&paths.state_path);
        store
            .schedule_cooldown(Provider::Claude, Utc::now())
            .expect("cooldown");
        for id in ["a", "b", "c"] {
            store.record_run(record(id)).expect("record");
        }

        let report = status_report(&paths, 2, Utc::now());
        let lock = report.lock.clone().expect("lock entry");
        assert_eq!(lock.holder, "42:abcdef");
        assert!(lock.live);
        assert!(matches!(
            report.providers[1],
            (Provider::Claude, Availability::CoolingDown { .. })
        ));
        let ids: Vec<&str> = report.runs.iter().map(|run| run.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        let text = render(&report);
        assert!(text.contains("held by 42:abcdef"));
        assert!(text.contains("- claude: cooldown until"));
        assert!(text.contains("[feat/task-c] task c"));
    }

    #[test]
    fn expired_lock_is_reported_as_expired() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::for_root(temp.path());
        let guard = LockManager::new(&paths.lock_path)
            .try_acquire(EXECUTOR_LOCK_KEY, "7:000000", 1, false)
            .expect("acquire");
        std::mem::forget(guard);

        let report = status_report(&paths, DEFAULT_RUN_LIMIT, Utc::now() + Duration::minutes(5));
        assert!(!report.lock.clone().expect("lock entry").live);
        assert!(render(&report).contains("expired (last holder 7:000000)"));
    }
}
