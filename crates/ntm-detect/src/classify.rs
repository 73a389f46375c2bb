//! Pure lexical state classification (§4.2). Grounded on the regex-table
//! approach of `groblegark-coop`'s screen parser, generalized from a single
//! user-configured pattern set to a fixed per-agent-type signature table
//! (the agent roster here is closed, unlike that project's plugin config).

use std::sync::OnceLock;

use regex::Regex;

use ntm_core::types::AgentType;

/// Scrollback shorter than this many non-blank lines is too ambiguous to
/// classify; callers get `Unknown`, never `Idle` (§4.2 edge case).
const MIN_NON_BLANK_LINES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectedState {
    Idle,
    Working,
    Generating,
    Error,
    Unknown,
}

struct SignatureTable {
    idle: Vec<Regex>,
    working: Vec<Regex>,
    generating: Vec<Regex>,
    error: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).expect("signature pattern is a compile-time constant")).collect()
}

fn claude_signatures() -> &'static SignatureTable {
    static TABLE: OnceLock<SignatureTable> = OnceLock::new();
    TABLE.get_or_init(|| SignatureTable {
        idle: compile(&[r"^\s*>\s*$", r"^\s*│\s*>\s*│?\s*$"]),
        working: compile(&[r"^\s*⏺", r"^\s*⎿", r"(?i)running tool", r"(?i)tool_use"]),
        generating: compile(&[r"(?i)^\s*\.{3}\s*$", r"(?i)thinking"]),
        error: compile(&[r"(?i)rate limit", r"(?i)overloaded", r"(?i)authentication error", r"(?i)api error"]),
    })
}

fn codex_signatures() -> &'static SignatureTable {
    static TABLE: OnceLock<SignatureTable> = OnceLock::new();
    TABLE.get_or_init(|| SignatureTable {
        idle: compile(&[r"^\s*▌\s*$", r"(?i)^codex>\s*$"]),
        working: compile(&[r"(?i)running command", r"(?i)applying patch", r"(?i)exec\s"]),
        generating: compile(&[r"(?i)^\s*\.{3}"]),
        error: compile(&[r"(?i)rate limit exceeded", r"\b401\b", r"(?i)unauthorized", r"(?i)context length exceeded"]),
    })
}

fn gemini_signatures() -> &'static SignatureTable {
    static TABLE: OnceLock<SignatureTable> = OnceLock::new();
    TABLE.get_or_init(|| SignatureTable {
        idle: compile(&[r"(?i)^gemini>\s*$", r"^\s*>\s*_?\s*$"]),
        working: compile(&[r"(?i)executing", r"(?i)calling function"]),
        generating: compile(&[r"(?i)^\s*\.{3}"]),
        error: compile(&[r"(?i)resource_exhausted", r"(?i)quota exceeded", r"(?i)permission_denied"]),
    })
}

/// Fallback table for agent types without a dedicated signature set
/// (Cursor, Windsurf, Aider, Ollama, and any unrecognized plugin).
fn generic_signatures() -> &'static SignatureTable {
    static TABLE: OnceLock<SignatureTable> = OnceLock::new();
    TABLE.get_or_init(|| SignatureTable {
        idle: compile(&[r"^\s*>\s*$", r"^\s*\$\s*$"]),
        working: compile(&[r"(?i)running", r"(?i)executing"]),
        generating: compile(&[r"(?i)^\s*\.{3}"]),
        error: compile(&[r"(?i)\berror\b", r"(?i)\bfailed\b", r"(?i)rate limit"]),
    })
}

fn signatures_for(agent_type: &AgentType) -> &'static SignatureTable {
    match agent_type {
        AgentType::Claude => claude_signatures(),
        AgentType::Codex => codex_signatures(),
        AgentType::Gemini => gemini_signatures(),
        _ => generic_signatures(),
    }
}

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ANSI CSI regex is a compile-time constant"))
}

fn strip_ansi(text: &str) -> String {
    ansi_regex().replace_all(text, "").to_string()
}

/// Classify a pane's state from its scrollback text and agent type. Pure
/// and deterministic: equal inputs always yield equal outputs (Testable
/// Property 9).
pub fn classify(scrollback: &str, agent_type: &AgentType) -> DetectedState {
    let stripped = strip_ansi(scrollback);
    let lines: Vec<&str> = stripped.lines().collect();
    let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();
    if non_blank < MIN_NON_BLANK_LINES {
        return DetectedState::Unknown;
    }

    let table = signatures_for(agent_type);

    if lines.iter().any(|line| table.error.iter().any(|re| re.is_match(line))) {
        return DetectedState::Error;
    }

    for line in lines.iter().rev() {
        if table.idle.iter().any(|re| re.is_match(line)) {
            return DetectedState::Idle;
        }
        if table.working.iter().any(|re| re.is_match(line)) {
            return DetectedState::Working;
        }
        if table.generating.iter().any(|re| re.is_match(line)) {
            return DetectedState::Generating;
        }
    }

    DetectedState::Unknown
}
