//! Ambient configuration, loaded from `<project>/.ntm/config.toml`. Mirrors
//! the teacher project's `Config` (one sub-struct per component family,
//! field-level `#[serde(default = "fn")]`, a `default_path`/`load`/`load_from`/
//! `to_toml` quartet).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtmConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub mux: MuxConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    #[serde(default)]
    pub spawn: SpawnConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub assign: AssignConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
}

impl Default for NtmConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            mux: MuxConfig::default(),
            ratelimit: RateLimitConfig::default(),
            spawn: SpawnConfig::default(),
            monitor: MonitorConfig::default(),
            assign: AssignConfig::default(),
            handoff: HandoffConfig::default(),
        }
    }
}

impl NtmConfig {
    /// Load from `<project_dir>/.ntm/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::default_path(project_dir);
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn default_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".ntm").join("config.toml")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Multiplexer driver tuning (§4.1, §5 timeouts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxConfig {
    #[serde(default = "default_pane_list_retries")]
    pub pane_list_retries: u32,
    #[serde(default = "default_pane_list_retry_delay_ms")]
    pub pane_list_retry_delay_ms: u64,
    #[serde(default = "default_capture_lines")]
    pub default_capture_lines: u32,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            pane_list_retries: default_pane_list_retries(),
            pane_list_retry_delay_ms: default_pane_list_retry_delay_ms(),
            default_capture_lines: default_capture_lines(),
        }
    }
}

fn default_pane_list_retries() -> u32 {
    5
}
fn default_pane_list_retry_delay_ms() -> u64 {
    100
}
fn default_capture_lines() -> u32 {
    200
}

/// Rate-limit tracker bounds (§4.3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_floor_secs")]
    pub floor_secs: f64,
    #[serde(default = "default_ceiling_secs")]
    pub ceiling_secs: f64,
    #[serde(default = "default_unknown_provider_secs")]
    pub unknown_provider_secs: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            floor_secs: default_floor_secs(),
            ceiling_secs: default_ceiling_secs(),
            unknown_provider_secs: default_unknown_provider_secs(),
            backoff_factor: default_backoff_factor(),
            decay_factor: default_decay_factor(),
        }
    }
}

fn default_floor_secs() -> f64 {
    2.0
}
fn default_ceiling_secs() -> f64 {
    120.0
}
fn default_unknown_provider_secs() -> f64 {
    30.0
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_decay_factor() -> f64 {
    0.85
}

/// Spawn & stagger engine timeouts (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    #[serde(default = "default_pane_init_delay_ms")]
    pub pane_init_delay_ms: u64,
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,
    #[serde(default = "default_ready_wait_secs")]
    pub ready_wait_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            pane_init_delay_ms: default_pane_init_delay_ms(),
            hook_timeout_secs: default_hook_timeout_secs(),
            ready_wait_secs: default_ready_wait_secs(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

fn default_pane_init_delay_ms() -> u64 {
    150
}
fn default_hook_timeout_secs() -> u64 {
    300
}
fn default_ready_wait_secs() -> u64 {
    60
}
fn default_settle_delay_ms() -> u64 {
    500
}

/// Resilience monitor tickers and restart policy (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_liveness_tick_secs")]
    pub liveness_tick_secs: u64,
    #[serde(default = "default_snapshot_tick_secs")]
    pub snapshot_tick_secs: u64,
    #[serde(default = "default_snapshot_lines")]
    pub snapshot_lines: u32,
    #[serde(default = "default_health_check_secs")]
    pub health_check_secs: u64,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            liveness_tick_secs: default_liveness_tick_secs(),
            snapshot_tick_secs: default_snapshot_tick_secs(),
            snapshot_lines: default_snapshot_lines(),
            health_check_secs: default_health_check_secs(),
            max_restarts: default_max_restarts(),
            restart_delay_secs: default_restart_delay_secs(),
        }
    }
}

fn default_liveness_tick_secs() -> u64 {
    5
}
fn default_snapshot_tick_secs() -> u64 {
    30
}
fn default_snapshot_lines() -> u32 {
    1000
}
fn default_health_check_secs() -> u64 {
    60
}
fn default_max_restarts() -> u32 {
    3
}
fn default_restart_delay_secs() -> u64 {
    10
}

/// Assignment engine defaults (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignConfig {
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    #[serde(default = "default_triage_limit")]
    pub triage_limit: u32,
}

impl Default for AssignConfig {
    fn default() -> Self {
        Self { default_strategy: default_strategy(), triage_limit: default_triage_limit() }
    }
}

fn default_strategy() -> String {
    "balanced".into()
}
fn default_triage_limit() -> u32 {
    20
}

/// Handoff ingest defaults (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: u64,
    #[serde(default = "default_reservation_grace_secs")]
    pub reservation_grace_secs: u64,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: default_reservation_ttl_secs(),
            reservation_grace_secs: default_reservation_grace_secs(),
        }
    }
}

fn default_reservation_ttl_secs() -> u64 {
    3600
}
fn default_reservation_grace_secs() -> u64 {
    30
}
