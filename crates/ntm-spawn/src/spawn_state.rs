//! Persisted per-session stagger schedule (§4.4, §3 `SpawnState`). Written
//! by the spawn engine as each pane's prompt goes out, read by dashboards,
//! and deleted five seconds after `completed_at` is set. Mutated from
//! multiple fan-out tasks concurrently, so the whole thing lives behind a
//! `Mutex` rather than per-field atomics — the store is small and writes are
//! infrequent (one per pane per spawn).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const SPAWN_STATE_DIR: &str = "spawn";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptStatus {
    pub pane: String,
    pub pane_id: String,
    pub order: u32,
    pub scheduled_at: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnStateData {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub stagger_seconds: f64,
    pub total_agents: u32,
    pub prompts: Vec<PromptStatus>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Grace period after `completed_at` before the snapshot is deleted, per
/// §3's "deleted >= 5s after completedAt".
pub const DELETE_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

pub struct SpawnState {
    data: Mutex<SpawnStateData>,
}

impl SpawnState {
    pub fn new(batch_id: impl Into<String>, stagger_seconds: f64, prompts: Vec<PromptStatus>) -> Self {
        let total_agents = prompts.len() as u32;
        Self {
            data: Mutex::new(SpawnStateData {
                batch_id: batch_id.into(),
                started_at: Utc::now(),
                stagger_seconds,
                total_agents,
                prompts,
                completed_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpawnStateData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark a pane's prompt as sent. `sent` only ever transitions false ->
    /// true; calling this on an already-sent pane is a no-op.
    pub fn mark_sent(&self, pane_id: &str) {
        let mut data = self.lock();
        if let Some(p) = data.prompts.iter_mut().find(|p| p.pane_id == pane_id) {
            if !p.sent {
                p.sent = true;
                p.sent_at = Some(Utc::now());
            }
        }
    }

    pub fn mark_completed(&self) {
        let mut data = self.lock();
        if data.completed_at.is_none() {
            data.completed_at = Some(Utc::now());
        }
    }

    pub fn all_sent(&self) -> bool {
        self.lock().prompts.iter().all(|p| p.sent)
    }

    pub fn snapshot(&self) -> SpawnStateData {
        self.lock().clone()
    }

    fn snapshot_path(project_dir: &Path, session: &str) -> PathBuf {
        project_dir.join(".ntm").join(SPAWN_STATE_DIR).join(format!("{session}.json"))
    }

    pub fn save(&self, project_dir: &Path, session: &str) -> Result<()> {
        let data = self.lock();
        ntm_core::atomic_io::write_json_atomic(&Self::snapshot_path(project_dir, session), &*data)?;
        Ok(())
    }

    pub fn load(project_dir: &Path, session: &str) -> Result<Option<SpawnStateData>> {
        Ok(ntm_core::atomic_io::read_json(&Self::snapshot_path(project_dir, session))?)
    }

    /// Delete the on-disk snapshot if `completed_at` is old enough
    /// (>= `DELETE_GRACE`). No-op if the session hasn't completed yet or the
    /// grace period hasn't elapsed.
    pub fn delete_if_expired(&self, project_dir: &Path, session: &str) -> Result<()> {
        let completed_at = self.lock().completed_at;
        let Some(completed_at) = completed_at else { return Ok(()) };
        let elapsed = Utc::now() - completed_at;
        if elapsed.to_std().unwrap_or_default() >= DELETE_GRACE {
            ntm_core::atomic_io::remove_if_exists(&Self::snapshot_path(project_dir, session))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(pane_id: &str, order: u32) -> PromptStatus {
        PromptStatus {
            pane: pane_id.to_string(),
            pane_id: pane_id.to_string(),
            order,
            scheduled_at: Utc::now(),
            sent: false,
            sent_at: None,
        }
    }

    #[test]
    fn mark_sent_only_transitions_false_to_true() {
        let state = SpawnState::new("batch-1", 5.0, vec![prompt("%1", 0)]);
        state.mark_sent("%1");
        let snap = state.snapshot();
        assert!(snap.prompts[0].sent);
        let first_sent_at = snap.prompts[0].sent_at;

        state.mark_sent("%1");
        let snap2 = state.snapshot();
        assert_eq!(snap2.prompts[0].sent_at, first_sent_at);
    }

    #[test]
    fn all_sent_reflects_every_prompt() {
        let state = SpawnState::new("batch-1", 5.0, vec![prompt("%1", 0), prompt("%2", 1)]);
        assert!(!state.all_sent());
        state.mark_sent("%1");
        assert!(!state.all_sent());
        state.mark_sent("%2");
        assert!(state.all_sent());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = SpawnState::new("batch-1", 2.5, vec![prompt("%1", 0)]);
        state.mark_sent("%1");
        state.save(dir.path(), "sess").unwrap();

        let loaded = SpawnState::load(dir.path(), "sess").unwrap().unwrap();
        assert_eq!(loaded.batch_id, "batch-1");
        assert!(loaded.prompts[0].sent);
    }

    #[test]
    fn delete_is_noop_before_completion() {
        let dir = tempfile::tempdir().unwrap();
        let state = SpawnState::new("batch-1", 1.0, vec![prompt("%1", 0)]);
        state.save(dir.path(), "sess").unwrap();
        state.delete_if_expired(dir.path(), "sess").unwrap();
        assert!(SpawnState::load(dir.path(), "sess").unwrap().is_some());
    }

    #[test]
    fn delete_is_noop_within_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let state = SpawnState::new("batch-1", 1.0, vec![prompt("%1", 0)]);
        state.mark_completed();
        state.save(dir.path(), "sess").unwrap();
        state.delete_if_expired(dir.path(), "sess").unwrap();
        assert!(SpawnState::load(dir.path(), "sess").unwrap().is_some());
    }
}
