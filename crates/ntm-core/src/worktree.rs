//! Git worktree fan-out for spawn's optional per-agent isolation (§4.4 step
//! 4). Adapted from the teacher project's `WorktreeManager`: branch naming
//! changes from `task/{name}` to the session-scoped `ntm/<session>/<type>_<index>`
//! the spec requires, and creation becomes all-or-nothing across a batch of
//! agents (§4.4: "any failure aborts the spawn; no partial worktrees left").

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::types::AgentType;

#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("git command failed: {0}")]
    GitCommand(String),
    #[error("worktree already exists: {0}")]
    AlreadyExists(String),
    #[error("worktree not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorktreeError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub path: String,
    pub branch: String,
    pub base_branch: String,
    pub agent_type: AgentType,
    pub index: u32,
}

/// Manages git worktrees for per-agent isolation. Each agent gets its own
/// worktree under `.worktrees/ntm/<session>/<type>_<index>/` and a branch
/// `ntm/<session>/<type>_<index>`, matching §4.4 step 4's naming.
pub struct WorktreeManager;

impl WorktreeManager {
    pub fn create_worktree(
        session: &str,
        agent_type: &AgentType,
        index: u32,
        base_branch: &str,
        project_dir: &str,
    ) -> Result<WorktreeInfo> {
        let branch_name = branch_name(session, agent_type, index);
        let worktree_dir = worktree_path(project_dir, &branch_name);

        if worktree_dir.exists() {
            return Err(WorktreeError::AlreadyExists(worktree_dir.display().to_string()));
        }

        let parent = worktree_dir.parent().expect(".worktrees parent");
        std::fs::create_dir_all(parent)?;

        let output = Command::new("git")
            .args(["worktree", "add", "-b", &branch_name, worktree_dir.to_str().unwrap(), base_branch])
            .current_dir(project_dir)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorktreeError::GitCommand(stderr.to_string()));
        }

        Ok(WorktreeInfo {
            path: worktree_dir.display().to_string(),
            branch: branch_name,
            base_branch: base_branch.to_string(),
            agent_type: agent_type.clone(),
            index,
        })
    }

    /// Create worktrees for every agent in `agents`, all-or-nothing: on the
    /// first failure, every worktree created so far in this call is torn
    /// down and the error is returned (§4.4 step 4 atomicity).
    pub fn create_batch(
        session: &str,
        agents: &[(AgentType, u32)],
        base_branch: &str,
        project_dir: &str,
    ) -> Result<Vec<WorktreeInfo>> {
        let mut created = Vec::new();
        for (agent_type, index) in agents {
            match Self::create_worktree(session, agent_type, *index, base_branch, project_dir) {
                Ok(info) => created.push(info),
                Err(e) => {
                    for info in &created {
                        let _ = Self::delete_worktree(&info.path, project_dir);
                    }
                    return Err(e);
                }
            }
        }
        Ok(created)
    }

    pub fn delete_worktree(path: &str, project_dir: &str) -> Result<()> {
        let wt_path = Path::new(path);
        if !wt_path.exists() {
            return Err(WorktreeError::NotFound(path.to_string()));
        }

        let output =
            Command::new("git").args(["worktree", "remove", "--force", path]).current_dir(project_dir).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorktreeError::GitCommand(stderr.to_string()));
        }
        Ok(())
    }
}

fn branch_name(session: &str, agent_type: &AgentType, index: u32) -> String {
    format!("ntm/{session}/{}_{index}", agent_type.title_tag())
}

fn worktree_path(project_dir: &str, branch_name: &str) -> PathBuf {
    Path::new(project_dir).join(".worktrees").join(branch_name.replace('/', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_matches_spec_grammar() {
        assert_eq!(branch_name("proj", &AgentType::Claude, 1), "ntm/proj/cc_1");
        assert_eq!(branch_name("proj", &AgentType::Codex, 2), "ntm/proj/cod_2");
    }

    #[test]
    fn create_worktree_rejects_duplicate_path() {
        let tmp = std::env::temp_dir();
        let name = "ntm-worktree-test-exists";
        let existing_path = tmp.join(".worktrees").join(format!("ntm-{name}-cc_1"));
        std::fs::create_dir_all(&existing_path).ok();

        // Force a path collision by constructing the same directory the
        // manager would compute for session `name`.
        let branch = branch_name(name, &AgentType::Claude, 1);
        let computed = worktree_path(tmp.to_str().unwrap(), &branch);
        std::fs::create_dir_all(&computed).ok();

        let result = WorktreeManager::create_worktree(name, &AgentType::Claude, 1, "main", tmp.to_str().unwrap());
        assert!(matches!(result, Err(WorktreeError::AlreadyExists(_))));

        std::fs::remove_dir_all(&computed).ok();
        std::fs::remove_dir_all(&existing_path).ok();
    }

    #[test]
    fn delete_worktree_rejects_nonexistent() {
        let result = WorktreeManager::delete_worktree("/nonexistent/path/xyz", "/tmp");
        assert!(matches!(result, Err(WorktreeError::NotFound(_))));
    }
}
