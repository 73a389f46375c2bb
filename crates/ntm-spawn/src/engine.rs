//! The spawn & stagger engine (§4.4): implements `spawn(opts)`'s 12-step
//! happy-path protocol end to end. Grounded on the teacher daemon's
//! spawn-then-detach pattern (`at-daemon::main`) for the monitor-launch
//! step, and on the teacher's `Orchestrator` fan-out style for the
//! one-task-per-agent barrier (`at-agents::orchestrator`), generalized from
//! a single in-process task map to a tokio `JoinSet` over real panes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::warn;

use ntm_core::agent_type::capability_for;
use ntm_core::contracts::{HookContext, HookEvent, HookExecutor};
use ntm_core::types::{AgentConfig, AgentType, FlatAgent, Provider, SessionManifest};
use ntm_core::worktree::WorktreeManager;
use ntm_detect::{classify, DetectedState};
use ntm_mux::{format_title, sanitize, send_multiline, MultiplexerDriver, PaneListRetry, USER_TYPE_TAG};
use ntm_ratelimit::RateLimitTracker;

/// How long step 12 waits for agents to go idle before giving up and
/// sending the init prompt anyway.
const IDLE_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const IDLE_SCROLLBACK_LINES: u32 = 200;

use crate::command::build_command;
use crate::error::{Result, SpawnError};
use crate::monitor_launch::MonitorLauncher;
use crate::spawn_state::{PromptStatus, SpawnState};
use crate::stagger::{compute_schedule, dominant_provider, StaggerMode};

/// `spawn(opts)`'s input (§4.4).
pub struct SpawnOptions {
    pub session: String,
    pub agents: Vec<FlatAgent>,
    pub user_pane: bool,
    pub auto_restart: bool,
    pub safety: bool,
    pub stagger_mode: StaggerMode,
    pub stagger_delay: Duration,
    pub init_prompt: Option<String>,
    pub recovery_context: Option<String>,
    pub use_worktrees: bool,
    pub assign: bool,
    pub pane_init_delay: Duration,
    pub settle_delay: Duration,
    pub base_branch: String,
}

impl SpawnOptions {
    pub fn new(session: impl Into<String>, agents: Vec<FlatAgent>) -> Self {
        Self {
            session: session.into(),
            agents,
            user_pane: false,
            auto_restart: false,
            safety: false,
            stagger_mode: StaggerMode::Smart,
            stagger_delay: Duration::from_secs(5),
            init_prompt: None,
            recovery_context: None,
            use_worktrees: false,
            assign: false,
            pane_init_delay: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
            base_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub session: String,
    pub panes: Vec<AgentConfig>,
    pub warnings: Vec<String>,
    pub monitor_pid: u32,
}

struct PaneAssignment {
    agent: FlatAgent,
    pane_id: String,
    pane_index: u32,
    working_dir: PathBuf,
}

/// Run the full spawn protocol. `project_dir` is the project's working
/// directory; on-disk state (`.ntm/`) lives under it. `driver` is an `Arc`
/// rather than a borrow because the post-spawn fan-out (step 8) hands a
/// clone to each per-agent task in the `JoinSet`.
pub async fn spawn(
    driver: Arc<dyn MultiplexerDriver>,
    hooks: &dyn HookExecutor,
    monitor: &dyn MonitorLauncher,
    tracker: &RateLimitTracker,
    project_dir: &Path,
    opts: SpawnOptions,
) -> Result<SpawnOutcome> {
    // --- Step 1: preflight ---
    driver.ensure_installed().await?;
    sanitize::validate_name(&opts.session).map_err(SpawnError::Mux)?;
    if opts.safety && driver.session_exists(&opts.session).await? {
        return Err(SpawnError::AlreadyExists(opts.session.clone()));
    }
    std::fs::create_dir_all(project_dir)?;

    let mut agent_counts: HashMap<String, u32> = HashMap::new();
    for a in &opts.agents {
        *agent_counts.entry(a.agent_type.title_tag().to_string()).or_insert(0) += 1;
    }
    let total_panes = opts.agents.len() as u32 + if opts.user_pane { 1 } else { 0 };

    // --- Step 2: pre-spawn hook barrier ---
    let pre_ctx = HookContext {
        session: opts.session.clone(),
        project_dir: project_dir.display().to_string(),
        agent_counts: agent_counts.clone(),
        pane_count: total_panes,
        pane_titles: Vec::new(),
        spawn_success: None,
    };
    if hooks.has_hooks_for_event(HookEvent::PreSpawn) {
        for result in hooks.run_hooks_for_event(&pre_ctx, HookEvent::PreSpawn).await {
            if result.exit_code != 0 {
                let _ = driver.kill_session(&opts.session).await;
                return Err(SpawnError::PreSpawnHookFailed {
                    hook: result.name,
                    code: result.exit_code,
                    stderr: result.stderr,
                });
            }
        }
    }

    match spawn_inner(Arc::clone(&driver), tracker, monitor, project_dir, &opts, total_panes).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            let _ = driver.kill_session(&opts.session).await;
            Err(e)
        }
    }
}

async fn spawn_inner(
    driver: Arc<dyn MultiplexerDriver>,
    tracker: &RateLimitTracker,
    monitor: &dyn MonitorLauncher,
    project_dir: &Path,
    opts: &SpawnOptions,
    total_panes: u32,
) -> Result<SpawnOutcome> {
    // --- Step 3: session materialization ---
    if !driver.session_exists(&opts.session).await? {
        let first_title = format_title(&opts.session, USER_TYPE_TAG, 1, None);
        driver.create_session(&opts.session, &first_title).await?;
    }

    // --- Step 4: worktree fan-out (optional, all-or-nothing) ---
    let mut working_dirs: HashMap<(AgentType, u32), PathBuf> = HashMap::new();
    if opts.use_worktrees {
        let roster: Vec<(AgentType, u32)> =
            opts.agents.iter().map(|a| (a.agent_type.clone(), a.index)).collect();
        let worktrees = WorktreeManager::create_batch(
            &opts.session,
            &roster,
            &opts.base_branch,
            &project_dir.display().to_string(),
        )?;
        for wt in worktrees {
            working_dirs.insert((wt.agent_type, wt.index), PathBuf::from(wt.path));
        }
    }

    // --- Step 5: pane provisioning ---
    // The session's first window already supplies one pane; split
    // (total_panes - 1) more times to reach the target count.
    for _ in 0..total_panes.saturating_sub(1) {
        driver.split_window(&opts.session).await?;
        if opts.pane_init_delay > Duration::ZERO {
            tokio::time::sleep(opts.pane_init_delay).await;
        }
    }
    // Re-enumerate via get_panes so ordering matches tmux's own view rather
    // than the order split_window happened to return ids in.
    let panes = driver.get_panes(&opts.session, PaneListRetry::default()).await?;
    let mut panes_by_index: Vec<_> = panes.into_iter().collect();
    panes_by_index.sort_by_key(|p| p.index);

    let mut assignments = Vec::with_capacity(opts.agents.len());
    for (slot, agent) in opts.agents.iter().enumerate() {
        let pane = panes_by_index
            .get(slot)
            .ok_or_else(|| SpawnError::Mux(ntm_mux::MuxError::NotFound(format!("pane slot {slot}"))))?;
        let variant = agent.model_alias.as_deref();
        let title = format_title(&opts.session, agent.agent_type.title_tag(), agent.index, variant);
        driver.set_pane_title(&pane.pane_id, &title).await?;

        let working_dir = working_dirs
            .get(&(agent.agent_type.clone(), agent.index))
            .cloned()
            .unwrap_or_else(|| project_dir.to_path_buf());

        assignments.push(PaneAssignment {
            agent: agent.clone(),
            pane_id: pane.pane_id.clone(),
            pane_index: pane.index,
            working_dir,
        });
    }
    if opts.user_pane {
        if let Some(pane) = panes_by_index.get(opts.agents.len()) {
            let title = format_title(&opts.session, USER_TYPE_TAG, 1, None);
            driver.set_pane_title(&pane.pane_id, &title).await?;
        }
    }

    // --- Step 6: command composition + cooldown gate (step 7) ---
    let mut warnings = Vec::new();
    let mut codex_gated = false;
    let mut commands: HashMap<String, String> = HashMap::with_capacity(assignments.len());
    for (order, assignment) in assignments.iter().enumerate() {
        if !codex_gated && assignment.agent.agent_type == AgentType::Codex {
            let remaining = tracker.cooldown_remaining(Provider::OpenAi);
            if remaining > Duration::ZERO {
                tokio::time::sleep(remaining).await;
            }
            codex_gated = true;
        }

        let command = build_command(
            &assignment.agent,
            &opts.session,
            order as u32,
            0,
            &assignment.working_dir,
            None,
        );
        if let Err(e) = driver.send_keys(&assignment.pane_id, &command, true).await {
            warnings.push(format!("pane {} command send failed: {e}", assignment.pane_id));
        }
        commands.insert(assignment.pane_id.clone(), command);
    }

    // --- Stagger schedule ---
    let dominant = dominant_provider(&opts.agents.iter().map(|a| a.agent_type.clone()).collect::<Vec<_>>());
    let schedule = compute_schedule(assignments.len(), opts.stagger_mode, opts.stagger_delay, tracker, dominant);

    let prompts: Vec<PromptStatus> = assignments
        .iter()
        .enumerate()
        .map(|(k, a)| PromptStatus {
            pane: a.pane_index.to_string(),
            pane_id: a.pane_id.clone(),
            order: k as u32,
            scheduled_at: chrono::Utc::now() + chrono::Duration::from_std(schedule[k]).unwrap_or_default(),
            sent: false,
            sent_at: None,
        })
        .collect();
    let spawn_state = Arc::new(SpawnState::new(opts.session.clone(), opts.stagger_delay.as_secs_f64(), prompts));
    spawn_state.save(project_dir, &opts.session)?;

    // --- Step 9: resilience monitor launch, BEFORE joining the barrier ---
    let manifest = SessionManifest {
        session: opts.session.clone(),
        project_dir: project_dir.display().to_string(),
        auto_restart: opts.auto_restart,
        agents: assignments
            .iter()
            .map(|a| AgentConfig {
                pane_id: a.pane_id.clone(),
                pane_index: a.pane_index,
                agent_type: a.agent.agent_type.clone(),
                model: a.agent.model_alias.clone(),
                command: commands.get(&a.pane_id).cloned().unwrap_or_default(),
            })
            .collect(),
    };
    let manifest_path = project_dir.join(".ntm").join("manifests").join(format!("{}.json", opts.session));
    ntm_core::atomic_io::write_json_atomic(&manifest_path, &manifest)?;
    let log_path = project_dir.join(".ntm").join("logs").join(format!("monitor-{}.log", opts.session));
    let monitor_pid = monitor.launch(&opts.session, project_dir, &log_path).await?;

    // --- Step 8: post-spawn fan-out, one task per agent ---
    // When `opts.assign` is set, the init prompt is held back for step 12
    // (delivered only once agents report idle) rather than sent blind here.
    let deliver_init_prompt_here = !opts.assign;
    let assignment_types: Vec<(String, AgentType)> =
        assignments.iter().map(|a| (a.pane_id.clone(), a.agent.agent_type.clone())).collect();

    let mut join_set = JoinSet::new();
    for (k, assignment) in assignments.into_iter().enumerate() {
        let driver = Arc::clone(&driver);
        let settle_delay = opts.settle_delay;
        let delay = schedule[k];
        let recovery_context = opts.recovery_context.clone();
        let init_prompt = if deliver_init_prompt_here { opts.init_prompt.clone() } else { None };
        let spawn_state = Arc::clone(&spawn_state);
        let capability = capability_for(&assignment.agent.agent_type);

        join_set.spawn(async move {
            // 8.1 agent-specific setup: intentionally minimal here; agent
            // idiosyncrasies (e.g. Gemini's Pro-model picker) live in the
            // per-capability record, not duplicated in the fan-out task.
            // 8.2 settling delay.
            if settle_delay > Duration::ZERO {
                tokio::time::sleep(settle_delay).await;
            }
            // 8.3 recovery context, if any. Rendered markdown is multi-line,
            // so it goes in a line at a time rather than one sendKeys call.
            if let Some(ctx) = recovery_context {
                let escaped = capability.shell_escape(&ctx);
                let _ = send_multiline(driver.as_ref(), &assignment.pane_id, &escaped).await;
            }
            // 8.4 user prompt, after the stagger delay.
            if let Some(prompt) = init_prompt {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                let escaped = capability.shell_escape(&prompt);
                let _ = driver.send_keys(&assignment.pane_id, &escaped, true).await;
            }
            // 8.5 mark sent regardless of whether a prompt was actually
            // supplied — an agent with no prompt has nothing pending.
            spawn_state.mark_sent(&assignment.pane_id);
        });
    }

    // --- Step 10: barrier, with best-effort signal handling ---
    let barrier = async {
        while join_set.join_next().await.is_some() {}
    };
    tokio::select! {
        _ = barrier => {}
        _ = tokio::signal::ctrl_c() => {
            warn!(session = %opts.session, "spawn interrupted during fan-out; monitor is already live, in-flight prompts may be undelivered");
            join_set.abort_all();
        }
    }
    spawn_state.mark_completed();
    spawn_state.save(project_dir, &opts.session)?;

    // --- Step 12: optional assignment phase ---
    // Wait for every agent to report idle (or time out), then deliver the
    // init prompt that step 8 deliberately withheld. Handing the roster off
    // to the dependency-aware assignment engine itself is a deferred
    // integration point (see DESIGN.md): it needs a `BeadStore` threaded
    // through `SpawnOptions`, which is out of scope for this pass.
    if opts.assign {
        wait_for_idle_and_deliver(&driver, &assignment_types, opts.init_prompt.as_deref(), IDLE_WAIT_TIMEOUT).await;
    }

    Ok(SpawnOutcome {
        session: opts.session.clone(),
        panes: manifest.agents,
        warnings,
        monitor_pid,
    })
}

/// Poll each pane until it classifies as idle (or `timeout` elapses), then
/// send `prompt` to every pane, idle or not — an agent that never settles
/// still gets the prompt queued for when it does.
async fn wait_for_idle_and_deliver(
    driver: &Arc<dyn MultiplexerDriver>,
    panes: &[(String, AgentType)],
    prompt: Option<&str>,
    timeout: Duration,
) {
    let Some(prompt) = prompt else { return };

    let deadline = tokio::time::Instant::now() + timeout;
    let mut pending: Vec<&(String, AgentType)> = panes.iter().collect();
    while !pending.is_empty() && tokio::time::Instant::now() < deadline {
        let mut still_pending = Vec::new();
        for entry @ (pane_id, agent_type) in pending {
            let scrollback = driver.capture_pane_output(pane_id, IDLE_SCROLLBACK_LINES).await.unwrap_or_default();
            match classify(&scrollback, agent_type) {
                DetectedState::Idle => {}
                _ => still_pending.push(entry),
            }
        }
        pending = still_pending;
        if !pending.is_empty() {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    for (pane_id, agent_type) in panes {
        let capability = capability_for(agent_type);
        let escaped = capability.shell_escape(prompt);
        let _ = driver.send_keys(pane_id, &escaped, true).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntm_core::config::RateLimitConfig;
    use ntm_core::contracts::NoopHookExecutor;
    use ntm_core::types::AgentType;
    use ntm_mux::FakeMultiplexerDriver;

    use crate::monitor_launch::FakeMonitorLauncher;

    fn tracker() -> RateLimitTracker {
        RateLimitTracker::new(RateLimitConfig {
            floor_secs: 0.01,
            ceiling_secs: 1.0,
            unknown_provider_secs: 0.01,
            backoff_factor: 2.0,
            decay_factor: 0.85,
        })
    }

    #[tokio::test]
    async fn spawns_panes_for_every_agent_and_launches_monitor() {
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeMultiplexerDriver::default());
        let hooks = NoopHookExecutor;
        let monitor = FakeMonitorLauncher::new();
        let tracker = tracker();
        let dir = tempfile::tempdir().unwrap();

        let mut opts = SpawnOptions::new("proj", vec![FlatAgent::new(AgentType::Claude, 1), FlatAgent::new(AgentType::Codex, 1)]);
        opts.stagger_mode = StaggerMode::None;
        opts.settle_delay = Duration::ZERO;

        let outcome = spawn(Arc::clone(&driver), &hooks, &monitor, &tracker, dir.path(), opts).await.unwrap();
        assert_eq!(outcome.panes.len(), 2);
        assert_eq!(outcome.monitor_pid, 4242);
        assert_eq!(monitor.calls().len(), 1);
    }

    #[tokio::test]
    async fn safety_mode_rejects_existing_session() {
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeMultiplexerDriver::default());
        driver.create_session("proj", "proj__user_1").await.unwrap();
        let hooks = NoopHookExecutor;
        let monitor = FakeMonitorLauncher::new();
        let tracker = tracker();
        let dir = tempfile::tempdir().unwrap();

        let mut opts = SpawnOptions::new("proj", vec![FlatAgent::new(AgentType::Claude, 1)]);
        opts.safety = true;

        let result = spawn(Arc::clone(&driver), &hooks, &monitor, &tracker, dir.path(), opts).await;
        assert!(matches!(result, Err(SpawnError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn pre_spawn_hook_failure_tears_down_and_aborts() {
        use async_trait::async_trait;
        use ntm_core::contracts::{HookResult, HookContext};

        struct FailingHook;
        #[async_trait]
        impl HookExecutor for FailingHook {
            fn has_hooks_for_event(&self, _event: HookEvent) -> bool {
                true
            }
            async fn run_hooks_for_event(&self, _ctx: &HookContext, _event: HookEvent) -> Vec<HookResult> {
                vec![HookResult { name: "check".into(), exit_code: 1, stderr: "nope".into() }]
            }
        }

        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeMultiplexerDriver::default());
        let hooks = FailingHook;
        let monitor = FakeMonitorLauncher::new();
        let tracker = tracker();
        let dir = tempfile::tempdir().unwrap();

        let opts = SpawnOptions::new("proj", vec![FlatAgent::new(AgentType::Claude, 1)]);
        let result = spawn(Arc::clone(&driver), &hooks, &monitor, &tracker, dir.path(), opts).await;
        assert!(matches!(result, Err(SpawnError::PreSpawnHookFailed { .. })));
        assert!(monitor.calls().is_empty());
    }

    #[tokio::test]
    async fn assign_mode_withholds_prompt_until_idle_then_delivers_it() {
        let fake = FakeMultiplexerDriver::default();
        fake.create_session("proj", "proj__user_1").await.unwrap();
        let pane_id = fake.get_panes("proj", PaneListRetry::default()).await.unwrap()[0].pane_id.clone();
        fake.push_output(&pane_id, "> \n");
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(fake);

        wait_for_idle_and_deliver(
            &driver,
            &[(pane_id.clone(), AgentType::Claude)],
            Some("start work"),
            Duration::from_secs(2),
        )
        .await;

        let transcript = driver.capture_pane_output(&pane_id, 10).await.unwrap();
        assert!(transcript.contains("start work"));
    }

    #[tokio::test]
    async fn init_prompt_is_delivered_once_not_baked_into_launch_command() {
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeMultiplexerDriver::default());
        let hooks = NoopHookExecutor;
        let monitor = FakeMonitorLauncher::new();
        let tracker = tracker();
        let dir = tempfile::tempdir().unwrap();

        let mut opts = SpawnOptions::new("proj", vec![FlatAgent::new(AgentType::Claude, 1)]);
        opts.stagger_mode = StaggerMode::None;
        opts.settle_delay = Duration::ZERO;
        opts.init_prompt = Some("implement the thing".into());

        let outcome = spawn(Arc::clone(&driver), &hooks, &monitor, &tracker, dir.path(), opts).await.unwrap();
        let pane_id = &outcome.panes[0].pane_id;
        assert!(!outcome.panes[0].command.contains("implement the thing"));

        let transcript = driver.capture_pane_output(pane_id, 20).await.unwrap();
        let occurrences = transcript.matches("implement the thing").count();
        assert_eq!(occurrences, 1);
    }

    #[tokio::test]
    async fn spawn_state_marks_every_pane_sent_after_barrier() {
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeMultiplexerDriver::default());
        let hooks = NoopHookExecutor;
        let monitor = FakeMonitorLauncher::new();
        let tracker = tracker();
        let dir = tempfile::tempdir().unwrap();

        let mut opts = SpawnOptions::new("proj", vec![FlatAgent::new(AgentType::Claude, 1)]);
        opts.stagger_mode = StaggerMode::None;
        opts.settle_delay = Duration::ZERO;
        opts.init_prompt = Some("start".into());

        spawn(Arc::clone(&driver), &hooks, &monitor, &tracker, dir.path(), opts).await.unwrap();

        let loaded = SpawnState::load(dir.path(), "proj").unwrap().unwrap();
        assert!(loaded.prompts.iter().all(|p| p.sent));
        assert!(loaded.completed_at.is_some());
    }
}
