//! The assignment engine (L7, §4.6): `assign` and `reassign`.

use std::collections::HashSet;

use ntm_core::contracts::BeadStore;
use ntm_core::types::{AgentType, AssignmentStatus, BeadPreview};
use ntm_detect::{classify, DetectedState};
use ntm_mux::{MultiplexerDriver, PaneListRetry};
use ntm_store::AssignmentStore;

use crate::error::{AssignError, ReassignError, ReassignResult, Result};
use crate::profile::{score_candidate, AgentProfile, ScoringHints};
use crate::strategy::{apply_strategy, ScoredCandidate, Strategy};

#[derive(Debug, Clone)]
pub enum SkipReason {
    BlockedByDependency(Vec<String>),
    InCycle,
    CannotHandle,
    AlreadyAssigned,
    TargetBusy,
}

#[derive(Debug, Clone)]
pub struct SkippedBead {
    pub bead_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct AssignOutcome {
    pub bead_id: String,
    pub pane_id: String,
    pub agent_type: AgentType,
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub total_beads: usize,
    pub actionable: usize,
    pub blocked: usize,
    pub assigned: usize,
    pub skipped: usize,
    pub idle_agents: usize,
}

#[derive(Debug, Clone)]
pub struct AssignOutput {
    pub assignments: Vec<AssignOutcome>,
    pub skipped: Vec<SkippedBead>,
    pub summary: Summary,
}

#[derive(Debug, Clone)]
pub struct AssignOptions {
    pub strategy: Strategy,
    pub agent_type_filter: Option<AgentType>,
    pub bead_ids: Option<Vec<String>>,
    pub triage_limit: usize,
    pub capture_lines: u32,
    pub prompt_template: PromptTemplate,
}

#[derive(Debug, Clone, Copy)]
pub enum PromptTemplate {
    Impl,
    Review,
}

fn expand_prompt(template: PromptTemplate, bead: &BeadPreview) -> String {
    match template {
        PromptTemplate::Impl => format!("Implement {}: {}", bead.id, bead.title),
        PromptTemplate::Review => format!("Review {}: {}", bead.id, bead.title),
    }
}

/// One idle pane paired with the agent type parsed from its title.
struct IdlePane {
    pane_id: String,
    agent_type: AgentType,
}

async fn idle_panes(driver: &dyn MultiplexerDriver, session: &str, capture_lines: u32, filter: Option<&AgentType>) -> Result<Vec<IdlePane>> {
    let panes = driver.get_panes(session, PaneListRetry::default()).await?;
    let mut out = Vec::new();
    for pane in panes {
        let Some(parsed) = ntm_mux::parse_title(&pane.title) else { continue };
        let Some(agent_type) = parsed.agent_type() else { continue };
        if let Some(filter) = filter {
            if &agent_type != filter {
                continue;
            }
        }
        let scrollback = driver.capture_pane_output(&pane.pane_id, capture_lines).await?;
        if classify(&scrollback, &agent_type) == DetectedState::Idle {
            out.push(IdlePane { pane_id: pane.pane_id, agent_type });
        }
    }
    Ok(out)
}

fn best_candidate_for(
    bead: &BeadPreview,
    idle: &[IdlePane],
    profiles: &[AgentProfile],
    hints: &ScoringHints,
    dependents_depth: u32,
) -> Option<ScoredCandidate> {
    idle.iter()
        .filter_map(|pane| {
            let profile = profiles.iter().find(|p| p.pane_id == pane.pane_id).cloned().unwrap_or_else(|| {
                AgentProfile::new(pane.agent_type.clone(), pane.pane_id.clone(), 0)
            });
            let score = score_candidate(&bead.id, &[], hints, &profile);
            if !score.can_handle {
                return None;
            }
            Some(ScoredCandidate {
                bead_id: bead.id.clone(),
                agent_type: pane.agent_type.clone(),
                pane_id: pane.pane_id.clone(),
                score,
                difficulty: 1.0,
                dependents_depth,
            })
        })
        .max_by(|a, b| a.score.value.partial_cmp(&b.score.value).unwrap_or(std::cmp::Ordering::Equal))
}

/// Reverse-topological depth per bead: the length of the longest chain of
/// beads that transitively depend on it (via `blocked_by`). A bead nothing
/// depends on has depth 0; a bead that unblocks a long downstream chain gets
/// a larger depth so `Strategy::Dependency` can surface it first.
fn dependents_depths(beads: &[BeadPreview]) -> std::collections::HashMap<String, u32> {
    let mut dependents: std::collections::HashMap<&str, Vec<&str>> = std::collections::HashMap::new();
    for b in beads {
        for dep in &b.blocked_by {
            dependents.entry(dep.as_str()).or_default().push(b.id.as_str());
        }
    }

    fn depth_of<'a>(
        id: &'a str,
        dependents: &std::collections::HashMap<&'a str, Vec<&'a str>>,
        cache: &mut std::collections::HashMap<String, u32>,
        visiting: &mut HashSet<String>,
    ) -> u32 {
        if let Some(d) = cache.get(id) {
            return *d;
        }
        if !visiting.insert(id.to_string()) {
            return 0;
        }
        let depth = match dependents.get(id) {
            Some(deps) => 1 + deps.iter().map(|dep_id| depth_of(dep_id, dependents, cache, visiting)).max().unwrap_or(0),
            None => 0,
        };
        visiting.remove(id);
        cache.insert(id.to_string(), depth);
        depth
    }

    let mut cache = std::collections::HashMap::new();
    for b in beads {
        let mut visiting = HashSet::new();
        depth_of(&b.id, &dependents, &mut cache, &mut visiting);
    }
    cache
}

/// Run the full assignment algorithm (§4.6 steps 1-8).
pub async fn assign(
    session: &str,
    driver: &dyn MultiplexerDriver,
    bead_store: &dyn BeadStore,
    store: &AssignmentStore,
    options: AssignOptions,
    profiles: &[AgentProfile],
    hints: &ScoringHints,
) -> Result<AssignOutput> {
    let idle = idle_panes(driver, session, options.capture_lines, options.agent_type_filter.as_ref()).await?;

    let candidate_beads = match &options.bead_ids {
        Some(ids) => {
            let mut beads = Vec::new();
            for id in ids {
                if let Ok(b) = bead_store.get_bead(id).await {
                    beads.push(b);
                }
            }
            beads
        }
        None => bead_store.get_triage(options.triage_limit).await?,
    };

    let total_beads = candidate_beads.len();
    let mut skipped = Vec::new();
    let mut actionable = Vec::new();
    for bead in candidate_beads.iter().cloned() {
        if bead.is_actionable() {
            actionable.push(bead);
        } else {
            skipped.push(SkippedBead { bead_id: bead.id.clone(), reason: SkipReason::BlockedByDependency(bead.blocked_by.clone()) });
        }
    }
    let blocked_count = skipped.len();

    let cycles = bead_store.check_cycles().await?;
    let cyclic: HashSet<String> = cycles.into_iter().flatten().collect();
    let (non_cyclic, cyclic_beads): (Vec<_>, Vec<_>) = actionable.into_iter().partition(|b| !cyclic.contains(&b.id));
    for bead in cyclic_beads {
        skipped.push(SkippedBead { bead_id: bead.id, reason: SkipReason::InCycle });
    }

    // Edges are drawn from the whole candidate pool (actionable and
    // currently-blocked alike) so a non-cyclic bead's depth reflects beads
    // still waiting on it, not just other already-actionable ones.
    let depths = dependents_depths(&candidate_beads);
    let mut scored = Vec::new();
    for bead in &non_cyclic {
        let depth = depths.get(&bead.id).copied().unwrap_or(0);
        match best_candidate_for(bead, &idle, profiles, hints, depth) {
            Some(candidate) => scored.push(candidate),
            None => skipped.push(SkippedBead { bead_id: bead.id.clone(), reason: SkipReason::CannotHandle }),
        }
    }

    let agent_order: Vec<AgentType> = {
        let mut seen = Vec::new();
        for pane in &idle {
            if !seen.contains(&pane.agent_type) {
                seen.push(pane.agent_type.clone());
            }
        }
        seen
    };
    let ranked = apply_strategy(options.strategy, scored, &agent_order);

    let beads_by_id: std::collections::HashMap<&str, &BeadPreview> = non_cyclic.iter().map(|b| (b.id.as_str(), b)).collect();
    let mut assignments = Vec::new();
    for candidate in ranked {
        match store.submit(&candidate.bead_id, &candidate.pane_id, candidate.agent_type.clone()) {
            Ok(assignment) => {
                let mut status = assignment.status;
                if let Some(bead) = beads_by_id.get(candidate.bead_id.as_str()) {
                    let prompt = expand_prompt(options.prompt_template, bead);
                    if let Err(e) = driver.send_keys(&candidate.pane_id, &prompt, true).await {
                        tracing::warn!(bead_id = %candidate.bead_id, error = %e, "prompt delivery failed");
                        if store.mark_failed(&candidate.bead_id).is_ok() {
                            status = AssignmentStatus::Failed;
                        }
                    }
                }
                assignments.push(AssignOutcome { bead_id: candidate.bead_id, pane_id: candidate.pane_id, agent_type: candidate.agent_type, status });
            }
            Err(ntm_store::AssignmentStoreError::AlreadyAssigned(_)) => {
                skipped.push(SkippedBead { bead_id: candidate.bead_id, reason: SkipReason::AlreadyAssigned });
            }
            Err(ntm_store::AssignmentStoreError::TargetBusy(_)) => {
                skipped.push(SkippedBead { bead_id: candidate.bead_id, reason: SkipReason::TargetBusy });
            }
            Err(e) => return Err(AssignError::Store(e)),
        }
    }

    let summary = Summary {
        total_beads,
        actionable: non_cyclic.len(),
        blocked: blocked_count,
        assigned: assignments.len(),
        skipped: skipped.len(),
        idle_agents: idle.len(),
    };

    Ok(AssignOutput { assignments, skipped, summary })
}

#[derive(Debug, Clone)]
pub enum ReassignTarget {
    Pane(String),
    AgentType(AgentType),
}

/// `reassign(beadID, {toPane | toAgentType})` (§4.6).
pub async fn reassign(
    driver: &dyn MultiplexerDriver,
    store: &AssignmentStore,
    session: &str,
    bead_id: &str,
    target: ReassignTarget,
) -> ReassignResult<AssignOutcome> {
    let existing = store.get(bead_id).ok_or_else(|| ReassignError::NotAssigned(bead_id.to_string()))?;
    if existing.status.is_terminal() {
        return Err(ReassignError::NotAssigned(bead_id.to_string()));
    }

    let (to_pane, agent_type) = match target {
        ReassignTarget::Pane(pane_id) => {
            if store.get_by_pane(&pane_id).map(|a| !a.status.is_terminal()).unwrap_or(false) {
                return Err(ReassignError::TargetBusy(pane_id));
            }
            (pane_id, existing.agent_type.clone())
        }
        ReassignTarget::AgentType(agent_type) => {
            let idle = idle_panes(driver, session, 200, Some(&agent_type)).await?;
            let free = idle
                .into_iter()
                .find(|p| store.get_by_pane(&p.pane_id).map(|a| a.status.is_terminal()).unwrap_or(true));
            match free {
                Some(pane) => (pane.pane_id, agent_type),
                None => return Err(ReassignError::NoIdleAgent(agent_type.to_string())),
            }
        }
    };

    store.mark_reassigned(bead_id)?;
    let new_assignment = store.submit(bead_id, &to_pane, agent_type.clone())?;
    Ok(AssignOutcome { bead_id: bead_id.to_string(), pane_id: to_pane, agent_type, status: new_assignment.status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntm_core::contracts::FakeBeadStore;
    use ntm_core::types::Priority;
    use ntm_mux::{format_title, FakeMultiplexerDriver};

    fn bead(id: &str, blocked_by: &[&str]) -> BeadPreview {
        BeadPreview { id: id.to_string(), title: format!("bead {id}"), priority: Priority::P2, blocked_by: blocked_by.iter().map(|s| s.to_string()).collect() }
    }

    async fn idle_claude_session() -> (FakeMultiplexerDriver, String) {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", &format_title("sess", "user", 0, None)).await.unwrap();
        let pane = driver.split_window("sess").await.unwrap();
        driver.set_pane_title(&pane, &format_title("sess", "cc", 1, None)).await.unwrap();
        driver.push_output(&pane, ">  \n");
        (driver, pane)
    }

    fn default_options() -> AssignOptions {
        AssignOptions {
            strategy: Strategy::Balanced,
            agent_type_filter: None,
            bead_ids: None,
            triage_limit: 20,
            capture_lines: 50,
            prompt_template: PromptTemplate::Impl,
        }
    }

    #[tokio::test]
    async fn assigns_actionable_bead_to_idle_pane() {
        let (driver, _pane) = idle_claude_session().await;
        let bead_store = FakeBeadStore::new();
        bead_store.insert(bead("b1", &[]));
        let store = AssignmentStore::new();

        let output = assign("sess", &driver, &bead_store, &store, default_options(), &[], &ScoringHints::default()).await.unwrap();

        assert_eq!(output.assignments.len(), 1);
        assert_eq!(output.assignments[0].bead_id, "b1");
        assert_eq!(output.summary.idle_agents, 1);
    }

    #[tokio::test]
    async fn blocked_bead_is_skipped_with_reason() {
        let (driver, _pane) = idle_claude_session().await;
        let bead_store = FakeBeadStore::new();
        bead_store.insert(bead("b1", &["b0"]));
        let store = AssignmentStore::new();

        let output = assign("sess", &driver, &bead_store, &store, default_options(), &[], &ScoringHints::default()).await.unwrap();

        assert!(output.assignments.is_empty());
        assert_eq!(output.skipped.len(), 1);
        assert!(matches!(output.skipped[0].reason, SkipReason::BlockedByDependency(_)));
    }

    #[tokio::test]
    async fn resubmitting_same_bead_is_idempotent() {
        let (driver, _pane) = idle_claude_session().await;
        let bead_store = FakeBeadStore::new();
        bead_store.insert(bead("b1", &[]));
        let store = AssignmentStore::new();

        assign("sess", &driver, &bead_store, &store, default_options(), &[], &ScoringHints::default()).await.unwrap();
        let second = assign("sess", &driver, &bead_store, &store, default_options(), &[], &ScoringHints::default()).await.unwrap();

        assert_eq!(second.assignments.len(), 1);
        assert_eq!(second.skipped.len(), 0);
    }

    #[tokio::test]
    async fn no_idle_panes_leaves_beads_unassigned() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", &format_title("sess", "user", 0, None)).await.unwrap();
        let bead_store = FakeBeadStore::new();
        bead_store.insert(bead("b1", &[]));
        let store = AssignmentStore::new();

        let output = assign("sess", &driver, &bead_store, &store, default_options(), &[], &ScoringHints::default()).await.unwrap();

        assert_eq!(output.summary.idle_agents, 0);
        assert!(output.assignments.is_empty());
    }

    #[tokio::test]
    async fn reassign_to_explicit_pane_moves_assignment() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", &format_title("sess", "user", 0, None)).await.unwrap();
        let pane1 = driver.split_window("sess").await.unwrap();
        driver.set_pane_title(&pane1, &format_title("sess", "cc", 1, None)).await.unwrap();
        let pane2 = driver.split_window("sess").await.unwrap();
        driver.set_pane_title(&pane2, &format_title("sess", "cc", 2, None)).await.unwrap();

        let store = AssignmentStore::new();
        store.submit("b1", &pane1, AgentType::Claude).unwrap();

        let result = reassign(&driver, &store, "sess", "b1", ReassignTarget::Pane(pane2.clone())).await.unwrap();
        assert_eq!(result.pane_id, pane2);
    }

    #[tokio::test]
    async fn dependency_strategy_prefers_bead_with_deeper_dependent_chain() {
        let (driver, pane1) = idle_claude_session().await;
        let pane2 = driver.split_window("sess").await.unwrap();
        driver.set_pane_title(&pane2, &format_title("sess", "cc", 2, None)).await.unwrap();
        driver.push_output(&pane2, ">  \n");
        let _ = pane1;

        let bead_store = FakeBeadStore::new();
        // b1 has no dependents; b2 unblocks b3, which unblocks b4 — a chain
        // two deep. b5 depends directly on b2 too, but that doesn't add depth.
        bead_store.insert(bead("b1", &[]));
        bead_store.insert(bead("b2", &[]));
        bead_store.insert(bead("b3", &["b2"]));
        bead_store.insert(bead("b4", &["b3"]));
        bead_store.insert(bead("b5", &["b2"]));
        let store = AssignmentStore::new();

        let mut options = default_options();
        options.strategy = Strategy::Dependency;
        options.triage_limit = 20;

        let output = assign("sess", &driver, &bead_store, &store, options, &[], &ScoringHints::default()).await.unwrap();

        // Both b1 and b2 are actionable with two idle panes available; b2
        // unblocks a longer downstream chain so it must be assigned first.
        assert_eq!(output.assignments[0].bead_id, "b2");
    }

    #[tokio::test]
    async fn reassign_fails_not_assigned_for_unknown_bead() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "title").await.unwrap();
        let store = AssignmentStore::new();

        let err = reassign(&driver, &store, "sess", "ghost", ReassignTarget::Pane("%1".into())).await.unwrap_err();
        assert!(matches!(err, ReassignError::NotAssigned(_)));
    }
}
