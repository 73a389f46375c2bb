use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Mux(#[from] ntm_mux::MuxError),

    #[error(transparent)]
    Core(#[from] ntm_core::error::CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
