//! Agent profile matcher (§4.6 step 5). Scoring needs bead metadata — labels,
//! touched files, an estimated token cost — that the read-only `BeadPreview`
//! view doesn't carry; callers that have it supply it via `ScoringHints`,
//! keyed by bead id. Absent hints score neutrally rather than penalizing the
//! bead, so assignment degrades gracefully when the bead store can't supply
//! the richer metadata.

use std::collections::HashMap;

use ntm_core::types::AgentType;

#[derive(Debug, Clone, Default)]
pub struct ScoringHints {
    pub labels: HashMap<String, Vec<String>>,
    pub estimated_tokens: HashMap<String, u64>,
    pub touched_files: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub agent_type: AgentType,
    pub pane_id: String,
    /// Labels this agent type specializes in; a hit contributes a fixed bonus.
    pub specializations: Vec<String>,
    /// Glob-style patterns (only `*` is a wildcard) matched against a bead's
    /// touched files.
    pub preferred_files: Vec<String>,
    pub preferred_labels: Vec<String>,
    pub context_budget_tokens: u64,
}

impl AgentProfile {
    pub fn new(agent_type: AgentType, pane_id: impl Into<String>, context_budget_tokens: u64) -> Self {
        Self {
            agent_type,
            pane_id: pane_id.into(),
            specializations: Vec::new(),
            preferred_files: Vec::new(),
            preferred_labels: Vec::new(),
            context_budget_tokens,
        }
    }

    pub fn with_specializations(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.specializations = labels.into_iter().collect();
        self
    }

    pub fn with_preferred_files(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.preferred_files = patterns.into_iter().collect();
        self
    }

    pub fn with_preferred_labels(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.preferred_labels = labels.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub can_handle: bool,
    pub specialization_hit: bool,
    pub value: f64,
}

const SPECIALIZATION_BONUS: f64 = 2.0;

/// `*` matches any run of characters; everything else is literal. No
/// character class or `?` support — the patterns used here are simple
/// directory/extension globs (`crates/**/*.rs`, `*.md`).
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(pattern: &[u8], text: &[u8]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&pattern[1..], text) || (!text.is_empty() && inner(pattern, &text[1..])),
            (Some(p), Some(t)) if p == t => inner(&pattern[1..], &text[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

fn any_file_matches(patterns: &[String], files: &[String]) -> bool {
    files.iter().any(|f| patterns.iter().any(|p| glob_match(p, f)))
}

/// Score a `(bead, agent)` pair (§4.6 step 5). A bead whose estimated token
/// cost exceeds the agent's context budget is marked `can_handle = false`
/// and its score suppressed to zero, but still returned so the caller can
/// report why it was skipped.
pub fn score_candidate(bead_id: &str, bead_labels_fallback: &[String], hints: &ScoringHints, profile: &AgentProfile) -> CandidateScore {
    let labels = hints.labels.get(bead_id).cloned().unwrap_or_else(|| bead_labels_fallback.to_vec());
    let estimated_tokens = hints.estimated_tokens.get(bead_id).copied().unwrap_or(0);
    let touched_files = hints.touched_files.get(bead_id).cloned().unwrap_or_default();

    let can_handle = profile.context_budget_tokens == 0 || estimated_tokens <= profile.context_budget_tokens;

    let specialization_hit = labels.iter().any(|l| profile.specializations.contains(l));
    let file_multiplier = if any_file_matches(&profile.preferred_files, &touched_files) { 1.5 } else { 1.0 };
    let label_multiplier = if labels.iter().any(|l| profile.preferred_labels.contains(l)) { 1.25 } else { 1.0 };

    let mut value = file_multiplier * label_multiplier;
    if specialization_hit {
        value += SPECIALIZATION_BONUS;
    }
    if !can_handle {
        value = 0.0;
    }

    CandidateScore { can_handle, specialization_hit, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_wildcard_extension() {
        assert!(glob_match("*.rs", "src/main.rs"));
        assert!(!glob_match("*.rs", "src/main.py"));
    }

    #[test]
    fn glob_matches_directory_prefix_wildcard() {
        assert!(glob_match("crates/*", "crates/ntm-core/src/lib.rs"));
    }

    #[test]
    fn specialization_hit_adds_bonus() {
        let profile = AgentProfile::new(AgentType::Claude, "%1", 100_000).with_specializations(["rust".into()]);
        let hints = ScoringHints::default();
        let score = score_candidate("b1", &["rust".to_string()], &hints, &profile);
        assert!(score.specialization_hit);
        assert!(score.value > SPECIALIZATION_BONUS);
    }

    #[test]
    fn over_budget_bead_cannot_be_handled() {
        let profile = AgentProfile::new(AgentType::Claude, "%1", 1_000);
        let mut hints = ScoringHints::default();
        hints.estimated_tokens.insert("b1".into(), 5_000);
        let score = score_candidate("b1", &[], &hints, &profile);
        assert!(!score.can_handle);
        assert_eq!(score.value, 0.0);
    }

    #[test]
    fn preferred_file_match_multiplies_score() {
        let profile = AgentProfile::new(AgentType::Codex, "%2", 100_000).with_preferred_files(["*.rs".to_string()]);
        let mut hints = ScoringHints::default();
        hints.touched_files.insert("b1".into(), vec!["src/lib.rs".to_string()]);
        let score = score_candidate("b1", &[], &hints, &profile);
        assert!(score.value > 1.0);
    }
}
