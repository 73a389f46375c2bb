use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("no handoff document found for session `{0}`")]
    NotFound(String),

    #[error("session `{0}` already exists")]
    AlreadyExists(String),

    #[error("session `{0}` does not exist")]
    NotExists(String),

    #[error("malformed handoff document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Core(#[from] ntm_core::error::CoreError),

    #[error(transparent)]
    Mux(#[from] ntm_mux::MuxError),

    #[error(transparent)]
    Spawn(#[from] ntm_spawn::SpawnError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HandoffError>;
