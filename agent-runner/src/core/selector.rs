//! Deterministic provider selection.

use std::error::Error;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::core::provider::Provider;
use crate::core::types::{OrchestratorState, parse_timestamp};

/// Why a candidate was passed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Executable not found on the search path.
    Missing,
    /// Waiting out a cooldown that ends at the given timestamp.
    CoolingDown { until: String },
}

/// Every candidate was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoProviderAvailableError {
    pub skipped: Vec<(Provider, SkipReason)>,
}

impl fmt::Display for NoProviderAvailableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no provider available right now")?;
        for (provider, reason) in &self.skipped {
            match reason {
                SkipReason::Missing => write!(
                    f,
                    "\n- {provider}: missing or unavailable (`{}` not on PATH)",
                    provider.binary()
                )?,
                SkipReason::CoolingDown { until } => {
                    write!(f, "\n- {provider}: cooldown until {until}")?;
                }
            }
        }
        Ok(())
    }
}

impl Error for NoProviderAvailableError {}

/// Return the active cooldown end if `provider` is cooling down at `now`.
///
/// Unparsable timestamps never block a provider.
pub fn active_cooldown(
    state: &OrchestratorState,
    provider: Provider,
    now: DateTime<Utc>,
) -> Option<String> {
    let until = state.provider(provider)?.cooldown_until.as_deref()?;
    let parsed = parse_timestamp(until)?;
    (parsed > now).then(|| until.to_string())
}

/// First candidate that is installed and not cooling down, in the given order.
pub fn select_provider(
    candidates: &[Provider],
    state: &OrchestratorState,
    now: DateTime<Utc>,
    is_installed: impl Fn(Provider) -> bool,
) -> Result<Provider, NoProviderAvailableError> {
    let mut skipped = Vec::new();
    for &provider in candidates {
        if !is_installed(provider) {
            skipped.push((provider, SkipReason::Missing));
            continue;
        }
        if let Some(until) = active_cooldown(state, provider, now) {
            skipped.push((provider, SkipReason::CoolingDown { until }));
            continue;
        }
        return Ok(provider);
    }
    Err(NoProviderAvailableError { skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::core::types::format_timestamp;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn cooling(state: &mut OrchestratorState, provider: Provider, until: DateTime<Utc>) {
        state.provider_mut(provider).cooldown_until = Some(format_timestamp(until));
    }

    #[test]
    fn picks_first_eligible_in_order_every_time() {
        let mut state = OrchestratorState::default();
        cooling(&mut state, Provider::Codex, now() + Duration::minutes(10));
        let installed = |provider: Provider| provider != Provider::Gemini;

        for _ in 0..5 {
            let chosen = select_provider(&Provider::ALL, &state, now(), installed).expect("select");
            assert_eq!(chosen, Provider::Claude);
        }
    }

    #[test]
    fn expired_and_unparsable_cooldowns_do_not_block() {
        let mut state = OrchestratorState::default();
        cooling(&mut state, Provider::Codex, now() - Duration::minutes(1));
        assert_eq!(
            select_provider(&Provider::ALL, &state, now(), |_| true),
            Ok(Provider::Codex)
        );

        state.provider_mut(Provider::Codex).cooldown_until = Some("garbage".to_string());
        assert_eq!(
            select_provider(&Provider::ALL, &state, now(), |_| true),
            Ok(Provider::Codex)
        );
    }

    #[test]
    fn forced_single_candidate_still_respects_cooldown() {
        let mut state = OrchestratorState::default();
        cooling(&mut state, Provider::Gemini, now() + Duration::minutes(15));

        let err = select_provider(&[Provider::Gemini], &state, now(), |_| true).unwrap_err();
        assert_eq!(
            err.skipped,
            vec![(
                Provider::Gemini,
                SkipReason::CoolingDown {
                    until: "2026-03-01T12:15:00.000Z".to_string()
                }
            )]
        );
    }

    #[test]
    fn diagnostic_lists_every_candidate() {
        let mut state = OrchestratorState::default();
        cooling(&mut state, Provider::Claude, now() + Duration::minutes(30));
        let err = select_provider(&Provider::ALL, &state, now(), |provider| {
            provider == Provider::Claude
        })
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.starts_with("no provider available right now"));
        assert!(msg.contains("- codex: missing or unavailable"));
        assert!(msg.contains("- claude: cooldown until 2026-03-01T12:30:00.000Z"));
        assert!(msg.contains("- gemini: missing or unavailable"));
    }

    #[test]
    fn missing_status_entry_means_available() {
        let mut state = OrchestratorState::default();
        state.providers.clear();
        assert_eq!(
            select_provider(&[Provider::Gemini], &state, now(), |_| true),
            Ok(Provider::Gemini)
        );
    }
}
