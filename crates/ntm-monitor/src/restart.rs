//! Per-agent restart bookkeeping (§4.5 restart policy): tracks how long a
//! pane has been reporting `error` and how many restart attempts it has
//! already used, bounded by `maxRestarts`.

use std::collections::HashMap;
use std::time::Duration;

use ntm_detect::DetectedState;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct RestartRecord {
    attempts: u32,
    error_since: Option<Instant>,
    exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do this tick.
    Healthy,
    /// Pane is dead or has been erroring past `health_check_secs`; try a restart.
    NeedsRestart,
    /// Already used `maxRestarts` attempts; do not try again.
    Exhausted,
}

#[derive(Default)]
pub struct RestartTracker {
    records: HashMap<String, RestartRecord>,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dead pane always needs a restart attempt, regardless of its last
    /// observed state.
    pub fn note_dead(&mut self, pane_id: &str) -> Decision {
        let record = self.records.entry(pane_id.to_string()).or_default();
        if record.exhausted {
            return Decision::Exhausted;
        }
        Decision::NeedsRestart
    }

    /// Feed the latest classification for a live pane. Error states are
    /// timed; a restart is only triggered once the error has persisted for
    /// at least `health_check`.
    pub fn note_state(&mut self, pane_id: &str, state: DetectedState, now: Instant, health_check: Duration) -> Decision {
        let record = self.records.entry(pane_id.to_string()).or_default();
        if record.exhausted {
            return Decision::Exhausted;
        }
        if state != DetectedState::Error {
            record.error_since = None;
            return Decision::Healthy;
        }
        let since = *record.error_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= health_check {
            Decision::NeedsRestart
        } else {
            Decision::Healthy
        }
    }

    /// Consume one restart attempt. Returns `false` (and marks the pane
    /// exhausted) once `max_restarts` attempts have already been spent.
    pub fn try_consume(&mut self, pane_id: &str, max_restarts: u32) -> bool {
        let record = self.records.entry(pane_id.to_string()).or_default();
        if record.attempts >= max_restarts {
            record.exhausted = true;
            return false;
        }
        record.attempts += 1;
        record.error_since = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sustained_error_triggers_restart_after_health_check_window() {
        let mut tracker = RestartTracker::new();
        let health_check = Duration::from_secs(10);
        let t0 = Instant::now();

        assert_eq!(tracker.note_state("%1", DetectedState::Error, t0, health_check), Decision::Healthy);
        tokio::time::advance(Duration::from_secs(11)).await;
        let t1 = Instant::now();
        assert_eq!(tracker.note_state("%1", DetectedState::Error, t1, health_check), Decision::NeedsRestart);
    }

    #[test]
    fn idle_after_error_resets_the_timer() {
        let mut tracker = RestartTracker::new();
        let health_check = Duration::from_secs(10);
        let t0 = Instant::now();
        tracker.note_state("%1", DetectedState::Error, t0, health_check);
        assert_eq!(tracker.note_state("%1", DetectedState::Idle, t0, health_check), Decision::Healthy);
    }

    #[test]
    fn exhausts_after_max_restarts() {
        let mut tracker = RestartTracker::new();
        assert!(tracker.try_consume("%1", 2));
        assert!(tracker.try_consume("%1", 2));
        assert!(!tracker.try_consume("%1", 2));
        assert_eq!(tracker.note_dead("%1"), Decision::Exhausted);
    }
}
