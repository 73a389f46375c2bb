//! Stagger scheduling (§4.4 step 6): assigns each pane in the spawn batch a
//! `k * I` delay before its prompt is sent, where `I` depends on
//! `StaggerMode`.

use std::time::Duration;

use ntm_core::types::{AgentType, Provider};
use ntm_ratelimit::RateLimitTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaggerMode {
    None,
    Fixed,
    Smart,
}

/// The provider with the highest stagger precedence (anthropic > openai >
/// google > local) among the agent types being spawned. Falls back to
/// `Provider::Local` for an empty roster.
pub fn dominant_provider(agent_types: &[AgentType]) -> Provider {
    agent_types
        .iter()
        .map(|t| t.provider())
        .min_by_key(|p| p.precedence())
        .unwrap_or(Provider::Local)
}

/// Interval `I` for the given mode. `smart` asks the rate-limit tracker for
/// the dominant provider's currently recommended delay.
fn interval(mode: StaggerMode, fixed_delay: Duration, tracker: &RateLimitTracker, dominant: Provider) -> Duration {
    match mode {
        StaggerMode::None => Duration::ZERO,
        StaggerMode::Fixed => fixed_delay,
        StaggerMode::Smart => tracker.get_optimal_delay(dominant),
    }
}

/// Compute the per-pane delay schedule for `n` panes: pane `k` (0-indexed)
/// waits `k * I` before its prompt goes out.
pub fn compute_schedule(
    n: usize,
    mode: StaggerMode,
    fixed_delay: Duration,
    tracker: &RateLimitTracker,
    dominant: Provider,
) -> Vec<Duration> {
    let i = interval(mode, fixed_delay, tracker, dominant);
    (0..n).map(|k| i.saturating_mul(k as u32)).collect()
}
