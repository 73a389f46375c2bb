//! Capability record per agent type (§9 design note), replacing
//! inheritance-style dispatch. Grounded directly on the teacher project's
//! `CliAdapter` trait and `adapter_for` factory.
//!
//! The `classify` member of the design note's capability record is realized
//! as a free function in `ntm-detect` keyed by the same [`AgentType`] rather
//! than a method here, so that the state-detector layer (L2) does not
//! depend back on the spawn/assignment layers that consume this module —
//! see DESIGN.md.

use crate::types::{AgentType, Provider};

/// Per-agent-type behavior the spawn engine needs at command-composition
/// time (§4.4 step 6) and the recovery-context renderer needs at injection
/// time (§3 `RecoveryContext`).
pub trait AgentCapability: Send + Sync {
    fn agent_type(&self) -> AgentType;
    fn binary_name(&self) -> &str;
    /// Flags that start this agent's long-lived interactive REPL in the
    /// pane. The user prompt is never part of this — it is delivered
    /// separately, once the pane is up, via `sendKeys` (§4.4 step 8.4).
    fn default_args(&self) -> Vec<String>;
    fn default_model(&self) -> &str;
    fn provider(&self) -> Provider {
        self.agent_type().provider()
    }
    /// Escape `text` for safe delivery into this agent's REPL via `sendKeys`.
    /// Most agents need no escaping; Codex's REPL glob-expands `[]`.
    fn shell_escape(&self, text: &str) -> String {
        text.to_string()
    }
}

struct ClaudeCapability;
struct CodexCapability;
struct GeminiCapability;
struct GenericCapability {
    agent_type: AgentType,
    binary_name: String,
}

impl AgentCapability for ClaudeCapability {
    fn agent_type(&self) -> AgentType {
        AgentType::Claude
    }
    fn binary_name(&self) -> &str {
        "claude"
    }
    fn default_args(&self) -> Vec<String> {
        vec!["--dangerously-skip-permissions".into()]
    }
    fn default_model(&self) -> &str {
        "sonnet"
    }
}

impl AgentCapability for CodexCapability {
    fn agent_type(&self) -> AgentType {
        AgentType::Codex
    }
    fn binary_name(&self) -> &str {
        "codex"
    }
    fn default_args(&self) -> Vec<String> {
        vec!["--approval-mode".into(), "full-auto".into()]
    }
    fn default_model(&self) -> &str {
        "o4"
    }
    fn shell_escape(&self, text: &str) -> String {
        text.replace('[', "\\[").replace(']', "\\]")
    }
}

impl AgentCapability for GeminiCapability {
    fn agent_type(&self) -> AgentType {
        AgentType::Gemini
    }
    fn binary_name(&self) -> &str {
        "gemini"
    }
    fn default_args(&self) -> Vec<String> {
        Vec::new()
    }
    fn default_model(&self) -> &str {
        "gemini-pro"
    }
}

impl AgentCapability for GenericCapability {
    fn agent_type(&self) -> AgentType {
        self.agent_type.clone()
    }
    fn binary_name(&self) -> &str {
        &self.binary_name
    }
    fn default_args(&self) -> Vec<String> {
        Vec::new()
    }
    fn default_model(&self) -> &str {
        "default"
    }
}

/// Factory resolving an [`AgentType`] to its capability record. Plugin
/// (`AgentType::Plugin`) and other non-core types fall back to a generic
/// capability whose binary name is the type's title tag — the plugin
/// registry (§9 design note) overrides `binary_name`/`default_args` at
/// registration time in the spawn engine.
pub fn capability_for(agent_type: &AgentType) -> Box<dyn AgentCapability> {
    match agent_type {
        AgentType::Claude => Box::new(ClaudeCapability),
        AgentType::Codex => Box::new(CodexCapability),
        AgentType::Gemini => Box::new(GeminiCapability),
        other => Box::new(GenericCapability {
            agent_type: other.clone(),
            binary_name: other.title_tag().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codex_escapes_brackets() {
        let cap = capability_for(&AgentType::Codex);
        assert_eq!(cap.shell_escape("do [x] thing"), "do \\[x\\] thing");
    }

    #[test]
    fn claude_passes_text_through_unescaped() {
        let cap = capability_for(&AgentType::Claude);
        assert_eq!(cap.shell_escape("do [x] thing"), "do [x] thing");
    }

    #[test]
    fn provider_defaults_to_agent_types_provider() {
        let cap = capability_for(&AgentType::Gemini);
        assert_eq!(cap.provider(), Provider::Google);
    }

    #[test]
    fn plugin_type_gets_generic_capability() {
        let cap = capability_for(&AgentType::Plugin("myagent".into()));
        assert_eq!(cap.binary_name(), "myagent");
    }
}
