//! The `resume` operation (§4.7): locate the latest handoff, optionally
//! transfer file reservations, and act on it in one of three modes. Grounded
//! on `ntm_spawn::spawn` for the `Spawn` mode fan-out and on
//! `RecoveryContext::render_markdown` for per-agent context formatting,
//! reusing the same once-per-pane-escaping discipline the spawn engine's
//! step 12 established for delivering held-back prompts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ntm_core::agent_type::capability_for;
use ntm_core::atomic_io;
use ntm_core::config::HandoffConfig;
use ntm_core::contracts::{HookExecutor, MailService, TransferResult};
use ntm_core::types::{AgentType, FlatAgent, RecoveryContext, SessionManifest};
use ntm_mux::{send_multiline, MultiplexerDriver};
use ntm_ratelimit::RateLimitTracker;
use ntm_spawn::{spawn, MonitorLauncher, SpawnOptions, SpawnOutcome};
use tracing::warn;

use crate::error::{HandoffError, Result};
use crate::reader::load;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    Display,
    Spawn,
    Inject,
}

pub struct ResumeOptions {
    pub session: String,
    pub mode: ResumeMode,
    pub from_file: Option<PathBuf>,
    /// Overrides the handoff's own `agent_counts` for `Spawn` mode, e.g. a
    /// user-supplied `--agents` flag at the CLI layer.
    pub agent_overrides: Option<Vec<FlatAgent>>,
    pub token_budget: usize,
    pub use_worktrees: bool,
}

impl ResumeOptions {
    pub fn new(session: impl Into<String>, mode: ResumeMode) -> Self {
        Self {
            session: session.into(),
            mode,
            from_file: None,
            agent_overrides: None,
            token_budget: 2000,
            use_worktrees: false,
        }
    }
}

pub struct ResumeOutcome {
    pub session: String,
    pub mode: ResumeMode,
    /// Unescaped markdown render of the recovery context, suitable for
    /// `Display` mode or logging. Per-pane injected text is re-rendered with
    /// that agent's own escaping rule rather than reused verbatim.
    pub rendered: String,
    pub warnings: Vec<String>,
    pub spawn_outcome: Option<SpawnOutcome>,
    pub injected_panes: Vec<String>,
    pub reservation_result: Option<TransferResult>,
}

fn manifest_path(project_dir: &Path, session: &str) -> PathBuf {
    project_dir.join(".ntm").join("manifests").join(format!("{session}.json"))
}

/// Expand a handoff's `agent_counts` (title tag -> count) into spawn-ready
/// agents, index 1..=count per type. `AgentType::from_str` is infallible —
/// an unrecognized tag becomes a `Plugin` agent rather than an error.
fn agents_from_counts(agent_counts: &HashMap<String, u32>) -> Vec<FlatAgent> {
    let mut agents = Vec::new();
    for (tag, count) in agent_counts {
        let agent_type = AgentType::from_str(tag).expect("AgentType::from_str is infallible");
        for index in 1..=*count {
            agents.push(FlatAgent::new(agent_type.clone(), index));
        }
    }
    agents
}

#[allow(clippy::too_many_arguments)]
pub async fn resume(
    opts: ResumeOptions,
    project_dir: &Path,
    driver: Arc<dyn MultiplexerDriver>,
    mail: &dyn MailService,
    hooks: &dyn HookExecutor,
    monitor: &dyn MonitorLauncher,
    tracker: &RateLimitTracker,
    handoff_config: &HandoffConfig,
) -> Result<ResumeOutcome> {
    let loaded = load(project_dir, &opts.session, opts.from_file.as_deref())?;
    let mut warnings = loaded.warnings;
    let mut ctx = loaded.document.context.clone();

    let mut reservation_result = None;
    if let Some(transfer) = &loaded.document.reservation_transfer {
        match mail
            .transfer_reservations(
                &transfer.from_identity,
                &opts.session,
                &transfer.paths,
                handoff_config.reservation_ttl_secs,
                handoff_config.reservation_grace_secs,
            )
            .await
        {
            Ok(result) => {
                ctx.file_reservations.extend(result.granted.iter().map(|p| format!("granted: {p}")));
                ctx.file_reservations.extend(result.conflicts.iter().map(|p| format!("conflict: {p}")));
                reservation_result = Some(result);
            }
            Err(e) => {
                warnings.push(format!("reservation transfer failed: {e}"));
            }
        }
    }

    // Unescaped render for Display and as the shared source re-escaped
    // per pane for Spawn/Inject — matches the engine's own single-string
    // `recovery_context` field, which it escapes per agent at delivery time.
    let rendered = ctx.render_markdown(|s| s.to_string(), opts.token_budget);

    match opts.mode {
        ResumeMode::Display => Ok(ResumeOutcome {
            session: opts.session,
            mode: ResumeMode::Display,
            rendered,
            warnings,
            spawn_outcome: None,
            injected_panes: Vec::new(),
            reservation_result,
        }),
        ResumeMode::Spawn => spawn_mode(opts, project_dir, driver, hooks, monitor, tracker, rendered, warnings, reservation_result, &loaded.document).await,
        ResumeMode::Inject => inject_mode(opts, project_dir, driver, &ctx, rendered, warnings, reservation_result).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn spawn_mode(
    opts: ResumeOptions,
    project_dir: &Path,
    driver: Arc<dyn MultiplexerDriver>,
    hooks: &dyn HookExecutor,
    monitor: &dyn MonitorLauncher,
    tracker: &RateLimitTracker,
    rendered: String,
    warnings: Vec<String>,
    reservation_result: Option<TransferResult>,
    document: &crate::document::HandoffDocument,
) -> Result<ResumeOutcome> {
    if driver.session_exists(&opts.session).await? {
        return Err(HandoffError::AlreadyExists(opts.session));
    }
    let agents = opts.agent_overrides.clone().unwrap_or_else(|| agents_from_counts(&document.agent_counts));

    let mut spawn_opts = SpawnOptions::new(opts.session.clone(), agents);
    spawn_opts.use_worktrees = opts.use_worktrees;
    spawn_opts.recovery_context = Some(rendered.clone());

    let outcome = spawn(driver, hooks, monitor, tracker, project_dir, spawn_opts).await?;
    let injected_panes = outcome.panes.iter().map(|p| p.pane_id.clone()).collect();

    Ok(ResumeOutcome {
        session: opts.session,
        mode: ResumeMode::Spawn,
        rendered,
        warnings,
        spawn_outcome: Some(outcome),
        injected_panes,
        reservation_result,
    })
}

async fn inject_mode(
    opts: ResumeOptions,
    project_dir: &Path,
    driver: Arc<dyn MultiplexerDriver>,
    ctx: &RecoveryContext,
    rendered: String,
    mut warnings: Vec<String>,
    reservation_result: Option<TransferResult>,
) -> Result<ResumeOutcome> {
    if !driver.session_exists(&opts.session).await? {
        return Err(HandoffError::NotExists(opts.session));
    }
    let path = manifest_path(project_dir, &opts.session);
    let manifest: SessionManifest =
        atomic_io::read_json(&path)?.ok_or_else(|| HandoffError::NotExists(opts.session.clone()))?;

    let mut injected_panes = Vec::new();
    for agent in &manifest.agents {
        let capability = capability_for(&agent.agent_type);
        let text = ctx.render_markdown(|s| capability.shell_escape(s), opts.token_budget);
        match send_multiline(driver.as_ref(), &agent.pane_id, &text).await {
            Ok(()) => injected_panes.push(agent.pane_id.clone()),
            Err(e) => {
                warn!(pane_id = %agent.pane_id, error = %e, "handoff injection failed");
                warnings.push(format!("inject into pane {} failed: {e}", agent.pane_id));
            }
        }
    }

    Ok(ResumeOutcome {
        session: opts.session,
        mode: ResumeMode::Inject,
        rendered,
        warnings,
        spawn_outcome: None,
        injected_panes,
        reservation_result,
    })
}
