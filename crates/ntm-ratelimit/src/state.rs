use chrono::{DateTime, Utc};
use ntm_core::types::Provider;
use serde::{Deserialize, Serialize};

/// Per-provider adaptive delay state, persisted as one entry of the
/// project's `.ntm/ratelimit.json` snapshot (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitState {
    pub provider: Provider,
    pub current_delay_secs: f64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_rate_limit: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl RateLimitState {
    pub fn initial(provider: Provider, floor_secs: f64, unknown_provider_secs: f64) -> Self {
        let current_delay_secs = if provider.rate_limits() { floor_secs } else { unknown_provider_secs };
        Self { provider, current_delay_secs, last_success: None, last_rate_limit: None, cooldown_until: None }
    }
}
