//! External-collaborator contracts (§6). NTM's hard core depends on these
//! traits only; the bead store, mail service, memory service, and hook
//! executor are separate binaries in the full system. Each trait ships an
//! in-memory fake used across every crate's test suite, grounded in the
//! teacher project's trait-plus-adapter pattern (`CliAdapter` / `adapter_for`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::BeadPreview;

// ---------------------------------------------------------------------------
// Bead store
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BeadStoreError {
    #[error("bead not found: {0}")]
    NotFound(String),
    #[error("bead store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait BeadStore: Send + Sync {
    async fn get_triage(&self, limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError>;
    async fn get_bead(&self, id: &str) -> Result<BeadPreview, BeadStoreError>;
    async fn claim(&self, id: &str, assignee: &str) -> Result<(), BeadStoreError>;
    async fn close(&self, id: &str, reason: &str) -> Result<(), BeadStoreError>;
    /// Returns the list of cycles, each a list of bead ids participating in it.
    async fn check_cycles(&self) -> Result<Vec<Vec<String>>, BeadStoreError>;
    async fn get_in_progress(&self, limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError>;
    async fn get_completed(&self, limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError>;
    async fn get_blocked(&self, limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError>;
}

/// Deterministic in-memory bead store used by every higher-layer test suite.
#[derive(Default)]
pub struct FakeBeadStore {
    beads: Mutex<HashMap<String, BeadPreview>>,
}

impl FakeBeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bead: BeadPreview) {
        self.beads.lock().unwrap_or_else(|e| e.into_inner()).insert(bead.id.clone(), bead);
    }

    pub fn remove_blocker(&self, bead_id: &str, blocker: &str) {
        let mut guard = self.beads.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bead) = guard.get_mut(bead_id) {
            bead.blocked_by.retain(|b| b != blocker);
        }
    }
}

#[async_trait]
impl BeadStore for FakeBeadStore {
    async fn get_triage(&self, limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError> {
        let guard = self.beads.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.values().take(limit).cloned().collect())
    }

    async fn get_bead(&self, id: &str) -> Result<BeadPreview, BeadStoreError> {
        let guard = self.beads.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(id).cloned().ok_or_else(|| BeadStoreError::NotFound(id.to_string()))
    }

    async fn claim(&self, _id: &str, _assignee: &str) -> Result<(), BeadStoreError> {
        Ok(())
    }

    async fn close(&self, id: &str, _reason: &str) -> Result<(), BeadStoreError> {
        let mut guard = self.beads.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(id);
        Ok(())
    }

    async fn check_cycles(&self) -> Result<Vec<Vec<String>>, BeadStoreError> {
        Ok(Vec::new())
    }

    async fn get_in_progress(&self, limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError> {
        self.get_triage(limit).await
    }

    async fn get_completed(&self, _limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError> {
        Ok(Vec::new())
    }

    async fn get_blocked(&self, limit: usize) -> Result<Vec<BeadPreview>, BeadStoreError> {
        let guard = self.beads.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.values().filter(|b| !b.is_actionable()).take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Mail service
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MailServiceError {
    #[error("mail service unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    pub from: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub path: String,
    pub holder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub granted: Vec<String>,
    pub conflicts: Vec<String>,
}

#[async_trait]
pub trait MailService: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn ensure_project(&self, dir: &str) -> Result<(), MailServiceError>;
    async fn create_agent_identity(
        &self,
        project: &str,
        program: &str,
        model: &str,
    ) -> Result<AgentIdentity, MailServiceError>;
    async fn fetch_inbox(&self, identity: &str) -> Result<Vec<InboxMessage>, MailServiceError>;
    async fn list_reservations(&self, identity: &str) -> Result<Vec<Reservation>, MailServiceError>;
    async fn transfer_reservations(
        &self,
        from: &str,
        to: &str,
        paths: &[String],
        ttl_secs: u64,
        grace_secs: u64,
    ) -> Result<TransferResult, MailServiceError>;
}

/// Always-unavailable mail service: every call degrades gracefully, matching
/// §7's "external-collaborator unavailability" policy.
#[derive(Default)]
pub struct NoopMailService;

#[async_trait]
impl MailService for NoopMailService {
    async fn is_available(&self) -> bool {
        false
    }

    async fn ensure_project(&self, _dir: &str) -> Result<(), MailServiceError> {
        Err(MailServiceError::Unavailable)
    }

    async fn create_agent_identity(
        &self,
        _project: &str,
        _program: &str,
        _model: &str,
    ) -> Result<AgentIdentity, MailServiceError> {
        Err(MailServiceError::Unavailable)
    }

    async fn fetch_inbox(&self, _identity: &str) -> Result<Vec<InboxMessage>, MailServiceError> {
        Err(MailServiceError::Unavailable)
    }

    async fn list_reservations(&self, _identity: &str) -> Result<Vec<Reservation>, MailServiceError> {
        Err(MailServiceError::Unavailable)
    }

    async fn transfer_reservations(
        &self,
        _from: &str,
        _to: &str,
        _paths: &[String],
        _ttl_secs: u64,
        _grace_secs: u64,
    ) -> Result<TransferResult, MailServiceError> {
        Err(MailServiceError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Memory service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryContext {
    pub rules: Vec<String>,
    pub anti_patterns: Vec<String>,
}

#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn get_context(&self, task: &str, max_rules: usize, max_snippets: usize) -> MemoryContext;
}

/// Missing-binary behavior: an empty result, never an error.
#[derive(Default)]
pub struct NoopMemoryService;

#[async_trait]
impl MemoryService for NoopMemoryService {
    async fn get_context(&self, _task: &str, _max_rules: usize, _max_snippets: usize) -> MemoryContext {
        MemoryContext::default()
    }
}

// ---------------------------------------------------------------------------
// Hook executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    PreSpawn,
    PostSpawn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookContext {
    pub session: String,
    pub project_dir: String,
    pub agent_counts: HashMap<String, u32>,
    pub pane_count: u32,
    pub pane_titles: Vec<String>,
    pub spawn_success: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResult {
    pub name: String,
    pub exit_code: i32,
    pub stderr: String,
}

#[async_trait]
pub trait HookExecutor: Send + Sync {
    fn has_hooks_for_event(&self, event: HookEvent) -> bool;
    async fn run_hooks_for_event(&self, ctx: &HookContext, event: HookEvent) -> Vec<HookResult>;
}

/// A hook executor with no hooks registered for any event.
#[derive(Default)]
pub struct NoopHookExecutor;

#[async_trait]
impl HookExecutor for NoopHookExecutor {
    fn has_hooks_for_event(&self, _event: HookEvent) -> bool {
        false
    }

    async fn run_hooks_for_event(&self, _ctx: &HookContext, _event: HookEvent) -> Vec<HookResult> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    #[tokio::test]
    async fn fake_bead_store_triage_and_close() {
        let store = FakeBeadStore::new();
        store.insert(BeadPreview {
            id: "a".into(),
            title: "A".into(),
            priority: Priority::P1,
            blocked_by: vec![],
        });
        let triage = store.get_triage(10).await.unwrap();
        assert_eq!(triage.len(), 1);

        store.close("a", "done").await.unwrap();
        assert!(store.get_bead("a").await.is_err());
    }

    #[tokio::test]
    async fn noop_mail_service_degrades_gracefully() {
        let mail = NoopMailService;
        assert!(!mail.is_available().await);
        assert!(mail.ensure_project("/tmp").await.is_err());
    }

    #[tokio::test]
    async fn noop_memory_service_returns_empty() {
        let memory = NoopMemoryService;
        let ctx = memory.get_context("task", 5, 5).await;
        assert!(ctx.rules.is_empty());
    }

    #[tokio::test]
    async fn noop_hook_executor_has_no_hooks() {
        let hooks = NoopHookExecutor;
        assert!(!hooks.has_hooks_for_event(HookEvent::PreSpawn));
        let ctx = HookContext::default();
        assert!(hooks.run_hooks_for_event(&ctx, HookEvent::PreSpawn).await.is_empty());
    }
}
