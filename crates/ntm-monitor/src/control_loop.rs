//! The resilience monitor's control loop (§4.5): liveness, snapshot, and
//! signal tickers plus the restart policy, grounded on the teacher's
//! `at-agents::supervisor::AgentSupervisor` restart-bookkeeping shape and
//! `at-daemon::main`'s ctrl-c-triggers-cleanup idiom, adapted from a single
//! long-running API daemon to a per-session watcher with no server surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ntm_core::config::MonitorConfig;
use ntm_core::types::SessionManifest;
use ntm_mux::{MultiplexerDriver, PaneListRetry};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::restart::{Decision, RestartTracker};
use crate::summary::{capture_git_diff, write_summary, PaneSnapshot, SessionSummary, TerminationCause};

pub fn manifest_path(project_dir: &Path, session: &str) -> PathBuf {
    project_dir.join(".ntm").join("manifests").join(format!("{session}.json"))
}

pub struct ResilienceMonitor {
    driver: Arc<dyn MultiplexerDriver>,
    project_dir: PathBuf,
    manifest: SessionManifest,
    config: MonitorConfig,
    restart_tracker: RestartTracker,
    snapshots: HashMap<String, Vec<String>>,
}

impl ResilienceMonitor {
    pub fn new(driver: Arc<dyn MultiplexerDriver>, project_dir: PathBuf, manifest: SessionManifest, config: MonitorConfig) -> Self {
        Self { driver, project_dir, manifest, config, restart_tracker: RestartTracker::new(), snapshots: HashMap::new() }
    }

    /// Load the manifest for `session` from disk. `Ok(None)` means the
    /// session has no manifest at all — the monitor should just exit 0.
    pub fn load(
        driver: Arc<dyn MultiplexerDriver>,
        project_dir: PathBuf,
        session: &str,
        config: MonitorConfig,
    ) -> Result<Option<Self>> {
        let path = manifest_path(&project_dir, session);
        match ntm_core::atomic_io::read_json::<SessionManifest>(&path)? {
            Some(manifest) => Ok(Some(Self::new(driver, project_dir, manifest, config))),
            None => Ok(None),
        }
    }

    /// `None` if the session is still live.
    async fn liveness_tick(&self) -> Option<TerminationCause> {
        match self.driver.session_exists(&self.manifest.session).await {
            Ok(true) => None,
            Ok(false) => Some(TerminationCause::SessionGone { detail: "session not listed".into() }),
            Err(e) => Some(TerminationCause::SessionGone { detail: format!("multiplexer error: {e}") }),
        }
    }

    async fn snapshot_tick(&mut self) {
        for agent in self.manifest.agents.clone() {
            if let Ok(text) = self.driver.capture_pane_output(&agent.pane_id, self.config.snapshot_lines).await {
                let lines: Vec<String> = text.lines().map(|s| s.to_string()).collect();
                self.snapshots.insert(agent.pane_id, lines);
            }
        }
    }

    /// Restart policy (§4.5). No-op unless `autoRestart` is set. Returns
    /// warnings for the caller to log — restart failures never abort the
    /// monitor itself.
    async fn health_tick(&mut self) -> Vec<String> {
        if !self.manifest.auto_restart {
            return Vec::new();
        }
        let mut warnings = Vec::new();
        let live_panes: std::collections::HashSet<String> =
            match self.driver.get_panes(&self.manifest.session, PaneListRetry::default()).await {
                Ok(panes) => panes.into_iter().map(|p| p.pane_id).collect(),
                Err(_) => return warnings,
            };
        let now = Instant::now();
        let health_check = Duration::from_secs(self.config.health_check_secs);

        for agent in self.manifest.agents.clone() {
            let alive = live_panes.contains(&agent.pane_id);
            let decision = if !alive {
                self.restart_tracker.note_dead(&agent.pane_id)
            } else {
                let scrollback = self.snapshots.get(&agent.pane_id).map(|l| l.join("\n")).unwrap_or_default();
                let state = ntm_detect::classify(&scrollback, &agent.agent_type);
                self.restart_tracker.note_state(&agent.pane_id, state, now, health_check)
            };

            match decision {
                Decision::Healthy => {}
                Decision::Exhausted => {
                    warnings.push(format!("pane {} exhausted restart attempts; marking agent failed", agent.pane_id));
                }
                Decision::NeedsRestart if !alive => {
                    // The multiplexer contract has no pane-revival primitive
                    // (only split_window, which always appends a new pane);
                    // a genuinely dead pane cannot be restarted into its
                    // original position, so it's marked failed instead.
                    warnings.push(format!("pane {} is gone and cannot be revived; marking agent failed", agent.pane_id));
                }
                Decision::NeedsRestart => {
                    if self.restart_tracker.try_consume(&agent.pane_id, self.config.max_restarts) {
                        tokio::time::sleep(Duration::from_secs(self.config.restart_delay_secs)).await;
                        if let Err(e) = self.driver.send_keys(&agent.pane_id, &agent.command, true).await {
                            warnings.push(format!("restart of pane {} failed: {e}", agent.pane_id));
                        } else {
                            info!(pane_id = %agent.pane_id, "restarted agent after sustained error");
                        }
                    } else {
                        warnings.push(format!("pane {} exhausted restart attempts; marking agent failed", agent.pane_id));
                    }
                }
            }
        }
        warnings
    }

    async fn finalize(&self, cause: TerminationCause) -> Result<()> {
        let panes = self
            .manifest
            .agents
            .iter()
            .map(|a| PaneSnapshot {
                pane_id: a.pane_id.clone(),
                agent_type: format!("{:?}", a.agent_type),
                lines: self.snapshots.get(&a.pane_id).cloned().unwrap_or_default(),
            })
            .collect();
        let summary = SessionSummary {
            session: self.manifest.session.clone(),
            ended_at: chrono::Utc::now(),
            cause,
            panes,
            git_diff: capture_git_diff(&self.project_dir),
        };
        write_summary(&self.project_dir, &summary)?;
        ntm_core::atomic_io::remove_if_exists(&manifest_path(&self.project_dir, &self.manifest.session))?;
        Ok(())
    }

    /// Run the control loop until the session ends or a termination signal
    /// arrives. Never returns an error for anything that happens to an
    /// individual agent — only for I/O failures finalizing the summary.
    pub async fn run(mut self) -> Result<()> {
        let mut liveness_ticker = tokio::time::interval(Duration::from_secs(self.config.liveness_tick_secs));
        let mut snapshot_ticker = tokio::time::interval(Duration::from_secs(self.config.snapshot_tick_secs));
        liveness_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        snapshot_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = liveness_ticker.tick() => {
                    if let Some(cause) = self.liveness_tick().await {
                        warn!(session = %self.manifest.session, ?cause, "session ended");
                        self.finalize(cause).await?;
                        return Ok(());
                    }
                    for w in self.health_tick().await {
                        warn!(session = %self.manifest.session, "{w}");
                    }
                }
                _ = snapshot_ticker.tick() => {
                    self.snapshot_tick().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    self.finalize(TerminationCause::SignalReceived { signal: "SIGINT".into() }).await?;
                    return Ok(());
                }
                #[cfg(unix)]
                _ = sigterm.recv() => {
                    self.finalize(TerminationCause::SignalReceived { signal: "SIGTERM".into() }).await?;
                    return Ok(());
                }
            }
        }
    }
}
