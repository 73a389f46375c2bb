use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error(transparent)]
    Core(#[from] ntm_core::error::CoreError),
}

pub type Result<T> = std::result::Result<T, RateLimitError>;
