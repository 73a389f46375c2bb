use ntm_core::types::AssignmentStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssignmentStoreError {
    #[error("no assignment found for bead `{0}`")]
    NotFound(String),

    #[error("bead `{0}` already has a non-terminal assignment on a different pane")]
    AlreadyAssigned(String),

    #[error("pane `{0}` already has a non-terminal assignment")]
    TargetBusy(String),

    #[error("cannot transition assignment for bead `{bead_id}` from {from:?} to {to:?}")]
    InvalidTransition { bead_id: String, from: AssignmentStatus, to: AssignmentStatus },

    #[error(transparent)]
    Core(#[from] ntm_core::error::CoreError),
}

pub type Result<T> = std::result::Result<T, AssignmentStoreError>;
