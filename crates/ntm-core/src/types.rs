//! Domain types shared across every NTM component: the agent/pane identity
//! model, the manifests persisted under `.ntm/`, and the assignment-store
//! records the engine and store crates operate on.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AgentType / Provider
// ---------------------------------------------------------------------------

/// Provider affinity for an [`AgentType`]; drives rate-limit tracker keys and
/// stagger-mode precedence (anthropic > openai > google > local).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
    Local,
}

impl Provider {
    /// Stagger-mode precedence used when choosing the dominant provider for
    /// `staggerMode=smart` (anthropic > openai > google > local).
    pub fn precedence(self) -> u8 {
        match self {
            Provider::Anthropic => 0,
            Provider::OpenAi => 1,
            Provider::Google => 2,
            Provider::Local => 3,
        }
    }

    /// Whether this provider is known to enforce rate limits; unknown
    /// providers fall back to a 30s default delay rather than zero.
    pub fn rate_limits(self) -> bool {
        matches!(self, Provider::Anthropic | Provider::OpenAi)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
            Provider::Local => "local",
        };
        f.write_str(s)
    }
}

/// Enumerated agent tag. `Plugin` carries a plugin-registered name for
/// agent types contributed at runtime (see `ntm_core::agent_type::registry`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Claude,
    Codex,
    Gemini,
    Cursor,
    Windsurf,
    Aider,
    Ollama,
    Plugin(String),
}

impl AgentType {
    /// The pane-title type tag (§6 grammar): `cc`, `cod`, `gmi`, or the
    /// literal name for everything else.
    pub fn title_tag(&self) -> &str {
        match self {
            AgentType::Claude => "cc",
            AgentType::Codex => "cod",
            AgentType::Gemini => "gmi",
            AgentType::Cursor => "cursor",
            AgentType::Windsurf => "windsurf",
            AgentType::Aider => "aider",
            AgentType::Ollama => "ollama",
            AgentType::Plugin(name) => name.as_str(),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            AgentType::Claude => Provider::Anthropic,
            AgentType::Codex => Provider::OpenAi,
            AgentType::Gemini => Provider::Google,
            AgentType::Cursor | AgentType::Windsurf | AgentType::Aider => Provider::OpenAi,
            AgentType::Ollama => Provider::Local,
            AgentType::Plugin(_) => Provider::Local,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title_tag())
    }
}

impl FromStr for AgentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "cc" => AgentType::Claude,
            "cod" => AgentType::Codex,
            "gmi" => AgentType::Gemini,
            "cursor" => AgentType::Cursor,
            "windsurf" => AgentType::Windsurf,
            "aider" => AgentType::Aider,
            "ollama" => AgentType::Ollama,
            other => AgentType::Plugin(other.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// FlatAgent / Pane
// ---------------------------------------------------------------------------

/// `(type, index >= 1, model-alias?)`. Index is per-type, monotonically
/// increasing within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatAgent {
    pub agent_type: AgentType,
    pub index: u32,
    pub model_alias: Option<String>,
}

impl FlatAgent {
    pub fn new(agent_type: AgentType, index: u32) -> Self {
        assert!(index >= 1, "FlatAgent index must be >= 1");
        Self { agent_type, index, model_alias: None }
    }

    pub fn with_model(mut self, model_alias: impl Into<String>) -> Self {
        self.model_alias = Some(model_alias.into());
        self
    }
}

/// `(id, session, index, title, type, variant, active, command)`. Owned by
/// the multiplexer; the orchestrator holds only a transient reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pane {
    pub id: String,
    pub session: String,
    pub index: u32,
    pub title: String,
    pub agent_type: Option<AgentType>,
    pub variant: Option<String>,
    pub active: bool,
    pub command: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionManifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub pane_id: String,
    pub pane_index: u32,
    pub agent_type: AgentType,
    pub model: Option<String>,
    pub command: String,
}

/// Persisted alongside session state on disk. Mutated only by the spawn
/// engine at session creation; read by the resilience monitor on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub session: String,
    pub project_dir: String,
    pub auto_restart: bool,
    pub agents: Vec<AgentConfig>,
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Working,
    Completed,
    Failed,
    Reassigned,
}

impl AssignmentStatus {
    /// Whether this status is a terminal state. At most one non-terminal
    /// assignment may exist per bead or pane at a time.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AssignmentStatus::Completed | AssignmentStatus::Failed | AssignmentStatus::Reassigned
        )
    }

    /// Validates the lifecycle: `assigned -> working -> terminal`, with
    /// `assigned -> terminal` also allowed (a bead can fail or be reassigned
    /// before the detector ever observes a non-idle state).
    pub fn can_transition_to(self, next: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        match (self, next) {
            (Assigned, Working) => true,
            (Assigned, Completed | Failed | Reassigned) => true,
            (Working, Completed | Failed | Reassigned) => true,
            _ => false,
        }
    }
}

/// `(beadID, paneID, agentType, status, assignedAt, updatedAt)`. The bead id
/// is primary; invariant: at most one non-terminal assignment per bead id,
/// at most one non-terminal assignment per pane id (enforced by the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub bead_id: String,
    pub pane_id: String,
    pub agent_type: AgentType,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(bead_id: impl Into<String>, pane_id: impl Into<String>, agent_type: AgentType) -> Self {
        let now = Utc::now();
        Self {
            bead_id: bead_id.into(),
            pane_id: pane_id.into(),
            agent_type,
            status: AssignmentStatus::Assigned,
            assigned_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// BeadPreview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
    P4,
}

/// Consumed, not owned: a read-only view of a bead from the external bead
/// store, sufficient for scoring and dependency filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeadPreview {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub blocked_by: Vec<String>,
}

impl BeadPreview {
    /// A bead with a non-empty `blocked_by` set is "not actionable".
    pub fn is_actionable(&self) -> bool {
        self.blocked_by.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RecoveryContext
// ---------------------------------------------------------------------------

/// Aggregate view built at spawn time; rendered into a single markdown block
/// per agent type. Sections are dropped lowest-priority-first when the
/// rendered block would exceed `token_budget` (approximated as 4 chars/token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryContext {
    pub in_progress: Vec<String>,
    pub completed: Vec<String>,
    pub blocked: Vec<String>,
    pub latest_checkpoint: Option<String>,
    pub inbox_messages: Vec<String>,
    pub file_reservations: Vec<String>,
    pub procedural_memories: Vec<String>,
}

/// A named, rendered section, ordered highest-priority-first so the caller
/// can drop from the tail.
struct Section {
    heading: &'static str,
    lines: Vec<String>,
}

impl RecoveryContext {
    fn sections(&self) -> Vec<Section> {
        vec![
            Section { heading: "In Progress", lines: self.in_progress.clone() },
            Section { heading: "Blocked", lines: self.blocked.clone() },
            Section {
                heading: "Checkpoint",
                lines: self.latest_checkpoint.clone().into_iter().collect(),
            },
            Section { heading: "Inbox", lines: self.inbox_messages.clone() },
            Section { heading: "File Reservations", lines: self.file_reservations.clone() },
            Section { heading: "Completed", lines: self.completed.clone() },
            Section { heading: "Procedural Memories", lines: self.procedural_memories.clone() },
        ]
    }

    /// Render into a single markdown block, escaping per the agent type's
    /// shell-escaping rule (see `ntm_core::agent_type`), capped to roughly
    /// `token_budget` tokens by dropping the lowest-priority sections first.
    pub fn render_markdown(&self, escape: impl Fn(&str) -> String, token_budget: usize) -> String {
        let char_budget = token_budget.saturating_mul(4);
        let mut sections = self.sections();
        sections.retain(|s| !s.lines.is_empty());

        loop {
            let rendered = render_sections(&sections, &escape);
            if rendered.len() <= char_budget || sections.is_empty() {
                return rendered;
            }
            sections.pop();
        }
    }
}

fn render_sections(sections: &[Section], escape: &impl Fn(&str) -> String) -> String {
    let mut out = String::from("## Recovery Context\n\n");
    for section in sections {
        out.push_str("### ");
        out.push_str(section.heading);
        out.push('\n');
        for line in &section.lines {
            out.push_str("- ");
            out.push_str(&escape(line));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Given the completed bead id and the full open-bead set, computes the
/// beads newly unblocked by its completion (§4.6 completion hook step 2),
/// excluding any bead found in `cyclic` (step 3).
pub fn newly_unblocked<'a>(
    completed_bead_id: &str,
    open_beads: impl IntoIterator<Item = &'a BeadPreview>,
    cyclic: &HashSet<String>,
) -> Vec<String> {
    open_beads
        .into_iter()
        .filter(|b| b.blocked_by.iter().any(|id| id == completed_bead_id))
        .filter(|b| b.blocked_by.len() == 1)
        .filter(|b| !cyclic.contains(&b.id))
        .map(|b| b.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_status_transitions() {
        assert!(AssignmentStatus::Assigned.can_transition_to(AssignmentStatus::Working));
        assert!(AssignmentStatus::Working.can_transition_to(AssignmentStatus::Completed));
        assert!(!AssignmentStatus::Completed.can_transition_to(AssignmentStatus::Working));
        assert!(!AssignmentStatus::Failed.can_transition_to(AssignmentStatus::Assigned));
    }

    #[test]
    fn bead_actionability() {
        let blocked = BeadPreview {
            id: "b".into(),
            title: "B".into(),
            priority: Priority::P2,
            blocked_by: vec!["a".into()],
        };
        assert!(!blocked.is_actionable());

        let free = BeadPreview { blocked_by: vec![], ..blocked };
        assert!(free.is_actionable());
    }

    #[test]
    fn newly_unblocked_requires_single_blocker() {
        let beads = vec![
            BeadPreview { id: "b".into(), title: "B".into(), priority: Priority::P2, blocked_by: vec!["a".into()] },
            BeadPreview {
                id: "c".into(),
                title: "C".into(),
                priority: Priority::P2,
                blocked_by: vec!["a".into(), "z".into()],
            },
        ];
        let cyclic = HashSet::new();
        let unblocked = newly_unblocked("a", &beads, &cyclic);
        assert_eq!(unblocked, vec!["b".to_string()]);
    }

    #[test]
    fn newly_unblocked_excludes_cycles() {
        let beads = vec![BeadPreview {
            id: "b".into(),
            title: "B".into(),
            priority: Priority::P2,
            blocked_by: vec!["a".into()],
        }];
        let mut cyclic = HashSet::new();
        cyclic.insert("b".to_string());
        assert!(newly_unblocked("a", &beads, &cyclic).is_empty());
    }

    #[test]
    fn recovery_context_drops_lowest_priority_sections_under_budget() {
        let ctx = RecoveryContext {
            in_progress: vec!["task one".into()],
            procedural_memories: vec!["remember this long note".repeat(50)],
            ..Default::default()
        };
        let rendered = ctx.render_markdown(|s| s.to_string(), 5);
        assert!(rendered.contains("In Progress"));
        assert!(!rendered.contains("Procedural Memories"));
    }
}
