//! Logging initialization shared by every NTM binary entry point (the spawn
//! CLI and the resilience monitor daemon). Grounded on the teacher
//! project's `at_telemetry::logging` module.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize human-readable logging, honoring `RUST_LOG` if set. Safe to
/// call multiple times — subsequent calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (human-readable)");
}

/// Initialize JSON-formatted logging (for the detached resilience monitor,
/// whose stdout/stderr is redirected to a per-session log file).
pub fn init_logging_json(service_name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (json)");
}
