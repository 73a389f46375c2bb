//! End-of-session summarization (§4.5): builds a handoff-style record from
//! the snapshot buffer accumulated by the control loop's 30s tick, plus a
//! best-effort `git diff`, and writes it to `.ntm/summaries/<session>-<ts>.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Why the monitor decided the session had ended. The L1 driver contract
/// only exposes a boolean `session_exists`, so the finer distinction the
/// original notes (tmux server down vs. no sessions vs. not listed) collapses
/// to one variant with a free-text detail rather than being guessed at this
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationCause {
    SessionGone { detail: String },
    SignalReceived { signal: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaneSnapshot {
    pub pane_id: String,
    pub agent_type: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: String,
    pub ended_at: chrono::DateTime<chrono::Utc>,
    pub cause: TerminationCause,
    pub panes: Vec<PaneSnapshot>,
    pub git_diff: Option<String>,
}

/// `git diff` against the working tree, run from `project_dir`. `None` if
/// the directory isn't a git worktree or the binary isn't on PATH — this is
/// a nice-to-have for the summary, never a hard requirement.
pub fn capture_git_diff(project_dir: &Path) -> Option<String> {
    let output = std::process::Command::new("git").arg("diff").current_dir(project_dir).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let diff = String::from_utf8_lossy(&output.stdout).into_owned();
    if diff.trim().is_empty() {
        None
    } else {
        Some(diff)
    }
}

pub fn summary_path(project_dir: &Path, session: &str, ended_at: chrono::DateTime<chrono::Utc>) -> std::path::PathBuf {
    project_dir.join(".ntm").join("summaries").join(format!("{session}-{}.json", ended_at.timestamp()))
}

pub fn write_summary(project_dir: &Path, summary: &SessionSummary) -> Result<()> {
    let path = summary_path(project_dir, &summary.session, summary.ended_at);
    ntm_core::atomic_io::write_json_atomic(&path, summary)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_diff_is_none_outside_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(capture_git_diff(dir.path()).is_none());
    }

    #[test]
    fn write_summary_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let summary = SessionSummary {
            session: "proj".into(),
            ended_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            cause: TerminationCause::SessionGone { detail: "session not listed".into() },
            panes: vec![PaneSnapshot { pane_id: "%1".into(), agent_type: "claude".into(), lines: vec!["> ".into()] }],
            git_diff: None,
        };
        write_summary(dir.path(), &summary).unwrap();
        let path = summary_path(dir.path(), "proj", summary.ended_at);
        assert!(path.exists());
        let loaded: SessionSummary = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(loaded.session, "proj");
    }
}
