use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("session `{0}` already exists")]
    AlreadyExists(String),

    #[error("pre-spawn hook `{hook}` exited {code}: {stderr}")]
    PreSpawnHookFailed { hook: String, code: i32, stderr: String },

    #[error(transparent)]
    Mux(#[from] ntm_mux::MuxError),

    #[error(transparent)]
    Worktree(#[from] ntm_core::worktree::WorktreeError),

    #[error(transparent)]
    Core(#[from] ntm_core::error::CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpawnError>;
