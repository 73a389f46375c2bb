//! Locates and validates handoff documents (§4.7). Handoffs live under
//! `.ntm/handoffs/<session>/*.yaml`; the reader picks the most recently
//! modified file unless an explicit path is given, and validates
//! warn-and-continue rather than failing the whole resume on a soft issue.

use std::fs;
use std::path::{Path, PathBuf};

use crate::document::HandoffDocument;
use crate::error::{HandoffError, Result};

pub fn handoffs_dir(project_dir: &Path, session: &str) -> PathBuf {
    project_dir.join(".ntm").join("handoffs").join(session)
}

/// Most recently modified `*.yaml` file in the session's handoff directory,
/// or `None` if the directory is absent or empty.
pub fn locate_latest(project_dir: &Path, session: &str) -> Option<PathBuf> {
    let dir = handoffs_dir(project_dir, session);
    let entries = fs::read_dir(&dir).ok()?;

    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else { continue };
        if best.as_ref().is_none_or(|(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }
    best.map(|(_, path)| path)
}

pub struct LoadedHandoff {
    pub document: HandoffDocument,
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

/// Validation is warn-and-continue: every issue found is appended to
/// `warnings`, never turned into an `Err`.
fn validate(session: &str, document: &HandoffDocument) -> Vec<String> {
    let mut warnings = Vec::new();
    if document.session != session {
        warnings.push(format!(
            "handoff document was written for session `{}`, resuming into `{session}`",
            document.session
        ));
    }
    let context_empty = document.context.in_progress.is_empty()
        && document.context.completed.is_empty()
        && document.context.blocked.is_empty()
        && document.context.latest_checkpoint.is_none()
        && document.context.inbox_messages.is_empty()
        && document.context.file_reservations.is_empty()
        && document.context.procedural_memories.is_empty();
    if context_empty {
        warnings.push("handoff document carries no recovery context".to_string());
    }
    if let Some(transfer) = &document.reservation_transfer {
        if transfer.paths.is_empty() {
            warnings.push("reservation transfer block has no paths listed".to_string());
        }
    }
    warnings
}

/// Load the handoff for `session`, either from `explicit` (the `--from
/// file` override) or by locating the latest one on disk.
pub fn load(project_dir: &Path, session: &str, explicit: Option<&Path>) -> Result<LoadedHandoff> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => locate_latest(project_dir, session).ok_or_else(|| HandoffError::NotFound(session.to_string()))?,
    };
    let text = fs::read_to_string(&path)?;
    let document = HandoffDocument::from_yaml(&text)?;
    let warnings = validate(session, &document);
    Ok(LoadedHandoff { document, path, warnings })
}
