//! The assignment store (L4). All mutations go through a single mutex
//! guarding the whole map, which stands in for the "critical section keyed
//! by (beadID, paneID)" the concurrency model calls for — at this scale a
//! single lock is simpler than per-key striping and gives the same
//! serializability guarantee. Poisoned-lock recovery follows the pattern
//! used by the fake collaborator stores in `ntm_core::contracts`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use ntm_core::atomic_io;
use ntm_core::types::{AgentType, Assignment, AssignmentStatus, BeadPreview};

use crate::cycles;
use crate::error::{AssignmentStoreError, Result};

const SNAPSHOT_FILE: &str = "assignments.json";

/// `(completedBeadID, newlyUnblocked, cyclesDetected, errors)` per the
/// completion hook contract (§4.6).
#[derive(Debug, Clone)]
pub struct DependencyAwareResult {
    pub completed_bead_id: String,
    pub newly_unblocked: Vec<String>,
    pub cycles_detected: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Default)]
struct StoreInner {
    by_bead: HashMap<String, Assignment>,
}

impl StoreInner {
    fn pane_busy_with_other_bead(&self, pane_id: &str, bead_id: &str) -> Option<&Assignment> {
        self.by_bead
            .values()
            .find(|a| a.pane_id == pane_id && a.bead_id != bead_id && !a.status.is_terminal())
    }
}

pub struct AssignmentStore {
    inner: Mutex<StoreInner>,
}

impl Default for AssignmentStore {
    fn default() -> Self {
        Self { inner: Mutex::new(StoreInner::default()) }
    }
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Idempotent submission: resubmitting the same `(bead, pane)` returns
    /// the existing assignment without sending a duplicate prompt.
    pub fn submit(&self, bead_id: &str, pane_id: &str, agent_type: AgentType) -> Result<Assignment> {
        let mut state = self.lock();

        if let Some(existing) = state.by_bead.get(bead_id) {
            if !existing.status.is_terminal() {
                if existing.pane_id == pane_id {
                    return Ok(existing.clone());
                }
                return Err(AssignmentStoreError::AlreadyAssigned(bead_id.to_string()));
            }
        }

        if let Some(busy) = state.pane_busy_with_other_bead(pane_id, bead_id) {
            return Err(AssignmentStoreError::TargetBusy(busy.pane_id.clone()));
        }

        let assignment = Assignment::new(bead_id, pane_id, agent_type);
        state.by_bead.insert(bead_id.to_string(), assignment.clone());
        Ok(assignment)
    }

    pub fn get(&self, bead_id: &str) -> Option<Assignment> {
        self.lock().by_bead.get(bead_id).cloned()
    }

    pub fn get_by_pane(&self, pane_id: &str) -> Option<Assignment> {
        self.lock().by_bead.values().find(|a| a.pane_id == pane_id).cloned()
    }

    pub fn list_non_terminal(&self) -> Vec<Assignment> {
        self.lock().by_bead.values().filter(|a| !a.status.is_terminal()).cloned().collect()
    }

    fn transition(&self, bead_id: &str, next: AssignmentStatus) -> Result<Assignment> {
        let mut state = self.lock();
        let assignment = state
            .by_bead
            .get_mut(bead_id)
            .ok_or_else(|| AssignmentStoreError::NotFound(bead_id.to_string()))?;

        if !assignment.status.can_transition_to(next) {
            return Err(AssignmentStoreError::InvalidTransition {
                bead_id: bead_id.to_string(),
                from: assignment.status,
                to: next,
            });
        }
        assignment.status = next;
        assignment.updated_at = chrono::Utc::now();
        Ok(assignment.clone())
    }

    pub fn mark_working(&self, bead_id: &str) -> Result<Assignment> {
        self.transition(bead_id, AssignmentStatus::Working)
    }

    pub fn mark_failed(&self, bead_id: &str) -> Result<Assignment> {
        self.transition(bead_id, AssignmentStatus::Failed)
    }

    pub fn mark_reassigned(&self, bead_id: &str) -> Result<Assignment> {
        self.transition(bead_id, AssignmentStatus::Reassigned)
    }

    /// Completion hook (§4.6): transitions to `completed`, then computes the
    /// dependency-aware result from the caller-supplied open-bead snapshot
    /// and dependency edges (the store holds no bead data of its own).
    pub fn complete_and_find_unblocked(
        &self,
        bead_id: &str,
        open_beads: &[BeadPreview],
        edges: &HashMap<String, Vec<String>>,
    ) -> Result<DependencyAwareResult> {
        self.transition(bead_id, AssignmentStatus::Completed)?;

        let cyclic = cycles::detect_cycles(edges);
        let newly_unblocked = ntm_core::types::newly_unblocked(bead_id, open_beads, &cyclic);

        Ok(DependencyAwareResult {
            completed_bead_id: bead_id.to_string(),
            newly_unblocked,
            cycles_detected: cyclic.into_iter().collect(),
            errors: Vec::new(),
        })
    }

    fn snapshot_path(dir: &Path) -> std::path::PathBuf {
        dir.join(SNAPSHOT_FILE)
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let store = Self::new();
        let loaded: Option<Vec<Assignment>> = atomic_io::read_json(&Self::snapshot_path(dir))?;
        if let Some(assignments) = loaded {
            let mut state = store.lock();
            for assignment in assignments {
                state.by_bead.insert(assignment.bead_id.clone(), assignment);
            }
        }
        Ok(store)
    }

    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        let snapshot: Vec<Assignment> = self.lock().by_bead.values().cloned().collect();
        atomic_io::write_json_atomic(&Self::snapshot_path(dir), &snapshot)?;
        Ok(())
    }
}
