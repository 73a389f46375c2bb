//! Adaptive delay oracle (L3, §4.3). Keyed by provider rather than by an
//! arbitrary string key, and backed by a multiplicative increase/decrease
//! delay rather than the teacher's token-bucket throughput limiter — the
//! concern here is "how long to wait before the next spawn/prompt", not
//! "how many requests per second". Dashmap concurrency is kept regardless.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use ntm_core::atomic_io;
use ntm_core::config::RateLimitConfig;
use ntm_core::types::Provider;

use crate::error::Result;
use crate::state::RateLimitState;

const SNAPSHOT_FILE: &str = "ratelimit.json";

#[derive(Debug)]
pub struct RateLimitTracker {
    config: RateLimitConfig,
    states: DashMap<Provider, RateLimitState>,
}

impl RateLimitTracker {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, states: DashMap::new() }
    }

    fn entry(&self, provider: Provider) -> dashmap::mapref::one::RefMut<'_, Provider, RateLimitState> {
        self.states
            .entry(provider)
            .or_insert_with(|| RateLimitState::initial(provider, self.config.floor_secs, self.config.unknown_provider_secs))
    }

    /// Current recommended spacing for `provider`. Never zero for a
    /// known-to-rate-limit provider; defaults to `unknown_provider_secs`
    /// otherwise.
    pub fn get_optimal_delay(&self, provider: Provider) -> Duration {
        let state = self.entry(provider);
        Duration::from_secs_f64(state.current_delay_secs.max(0.0))
    }

    /// Multiplicatively decrease the delay toward the configured floor.
    pub fn record_success(&self, provider: Provider) {
        let mut state = self.entry(provider);
        state.current_delay_secs = (state.current_delay_secs * self.config.decay_factor).max(self.config.floor_secs);
        state.last_success = Some(Utc::now());
    }

    /// Multiplicatively increase the delay (capped at the ceiling). If
    /// `retry_after` is given, also opens a cooldown window.
    pub fn record_rate_limit(&self, provider: Provider, retry_after: Option<Duration>) {
        let mut state = self.entry(provider);
        state.current_delay_secs = (state.current_delay_secs * self.config.backoff_factor).min(self.config.ceiling_secs);
        let now = Utc::now();
        state.last_rate_limit = Some(now);
        if let Some(retry_after) = retry_after {
            state.cooldown_until = Some(now + chrono::Duration::from_std(retry_after).unwrap_or_default());
        }
    }

    /// Remaining cooldown, or zero if none is active / it has elapsed.
    pub fn cooldown_remaining(&self, provider: Provider) -> Duration {
        let state = self.entry(provider);
        match state.cooldown_until {
            Some(until) => {
                let remaining = until - Utc::now();
                remaining.to_std().unwrap_or(Duration::ZERO)
            }
            None => Duration::ZERO,
        }
    }

    fn snapshot_path(dir: &Path) -> std::path::PathBuf {
        dir.join(SNAPSHOT_FILE)
    }

    /// Load persisted per-provider state from `dir` (typically
    /// `<project>/.ntm`), replacing any in-memory state for loaded providers.
    pub fn load_from_dir(config: RateLimitConfig, dir: &Path) -> Result<Self> {
        let tracker = Self::new(config);
        let loaded: Option<Vec<RateLimitState>> = atomic_io::read_json(&Self::snapshot_path(dir))?;
        if let Some(states) = loaded {
            for state in states {
                tracker.states.insert(state.provider, state);
            }
        }
        Ok(tracker)
    }

    /// Atomically persist all tracked provider state to `dir`.
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        let snapshot: Vec<RateLimitState> = self.states.iter().map(|entry| entry.value().clone()).collect();
        atomic_io::write_json_atomic(&Self::snapshot_path(dir), &snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            floor_secs: 2.0,
            ceiling_secs: 120.0,
            unknown_provider_secs: 30.0,
            backoff_factor: 2.0,
            decay_factor: 0.85,
        }
    }

    #[test]
    fn known_provider_defaults_to_floor_not_zero() {
        let tracker = RateLimitTracker::new(test_config());
        assert_eq!(tracker.get_optimal_delay(Provider::Anthropic), Duration::from_secs_f64(2.0));
    }

    #[test]
    fn unknown_provider_defaults_to_thirty_seconds() {
        let tracker = RateLimitTracker::new(test_config());
        assert_eq!(tracker.get_optimal_delay(Provider::Local), Duration::from_secs_f64(30.0));
    }

    #[test]
    fn rate_limit_increases_delay_up_to_ceiling() {
        let tracker = RateLimitTracker::new(test_config());
        for _ in 0..20 {
            tracker.record_rate_limit(Provider::OpenAi, None);
        }
        assert!(tracker.get_optimal_delay(Provider::OpenAi).as_secs_f64() <= 120.0);
    }

    #[test]
    fn success_decays_delay_toward_floor() {
        let tracker = RateLimitTracker::new(test_config());
        tracker.record_rate_limit(Provider::Anthropic, None);
        let elevated = tracker.get_optimal_delay(Provider::Anthropic);
        tracker.record_success(Provider::Anthropic);
        let decayed = tracker.get_optimal_delay(Provider::Anthropic);
        assert!(decayed < elevated);
        assert!(decayed.as_secs_f64() >= 2.0);
    }

    #[test]
    fn cooldown_remaining_reflects_retry_after() {
        let tracker = RateLimitTracker::new(test_config());
        tracker.record_rate_limit(Provider::Anthropic, Some(Duration::from_secs(60)));
        let remaining = tracker.cooldown_remaining(Provider::Anthropic);
        assert!(remaining.as_secs() > 0 && remaining.as_secs() <= 60);
    }

    #[test]
    fn no_rate_limit_means_no_cooldown() {
        let tracker = RateLimitTracker::new(test_config());
        assert_eq!(tracker.cooldown_remaining(Provider::Anthropic), Duration::ZERO);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = RateLimitTracker::new(test_config());
        tracker.record_rate_limit(Provider::Anthropic, Some(Duration::from_secs(45)));
        tracker.save_to_dir(dir.path()).unwrap();

        let reloaded = RateLimitTracker::load_from_dir(test_config(), dir.path()).unwrap();
        assert!(reloaded.cooldown_remaining(Provider::Anthropic).as_secs() > 0);
    }

    #[test]
    fn load_from_empty_dir_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = RateLimitTracker::load_from_dir(test_config(), dir.path()).unwrap();
        assert_eq!(tracker.get_optimal_delay(Provider::Anthropic), Duration::from_secs_f64(2.0));
    }
}
