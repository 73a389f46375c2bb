//! The resilience monitor binary (§4.4 step 9, §4.5): spawned as a detached
//! child by the spawn engine, one instance per session, logging to
//! `.ntm/logs/monitor-<session>.log`. Grounded on the teacher's
//! `at-daemon::main` shape (tracing init, lockfile guard, ctrl-c wiring),
//! shrunk from a long-running API daemon to a single-session watcher with
//! no server surface of its own.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ntm_core::config::NtmConfig;
use ntm_core::lockfile::{monitor_pid_path, AcquireResult, PidLock};
use ntm_monitor::ResilienceMonitor;
use ntm_mux::{MultiplexerDriver, TmuxDriver};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ntm-monitor")]
struct Args {
    /// Session name to watch.
    session: String,

    #[arg(long = "project-dir")]
    project_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    ntm_telemetry::init_logging_json("ntm-monitor", "info");
    info!(session = %args.session, pid = std::process::id(), "resilience monitor starting");

    let lock_path = monitor_pid_path(&args.project_dir, &args.session);
    let lock = PidLock::new(&args.session);
    match lock.acquire(&lock_path).context("failed to acquire monitor lockfile")? {
        AcquireResult::Acquired | AcquireResult::StaleRemoved => {}
        AcquireResult::AlreadyRunning(existing) => {
            eprintln!("monitor for session `{}` already running (pid={})", args.session, existing.pid);
            std::process::exit(1);
        }
    }

    let config = NtmConfig::load(&args.project_dir).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NtmConfig::default()
    });

    let driver: Arc<dyn MultiplexerDriver> = Arc::new(TmuxDriver::default());
    let monitor = match ResilienceMonitor::load(driver, args.project_dir.clone(), &args.session, config.monitor)
        .context("failed to load session manifest")?
    {
        Some(monitor) => monitor,
        None => {
            info!(session = %args.session, "no manifest found, nothing to watch");
            PidLock::remove(&lock_path);
            return Ok(());
        }
    };

    let result = monitor.run().await;
    PidLock::remove(&lock_path);
    result.context("resilience monitor control loop failed")?;
    Ok(())
}
