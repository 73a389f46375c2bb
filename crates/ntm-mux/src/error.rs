use thiserror::Error;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("session or pane already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("unsafe text for send_keys: {0}")]
    UnsafeText(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("multiplexer command failed: {0}")]
    CommandFailed(String),

    #[error("multiplexer binary not installed or not on PATH")]
    NotInstalled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MuxError>;
