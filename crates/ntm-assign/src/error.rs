use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssignError {
    #[error("unknown assignment strategy: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    Mux(#[from] ntm_mux::MuxError),

    #[error(transparent)]
    BeadStore(#[from] ntm_core::contracts::BeadStoreError),

    #[error(transparent)]
    Store(#[from] ntm_store::AssignmentStoreError),
}

#[derive(Debug, Error)]
pub enum ReassignError {
    #[error("NOT_ASSIGNED: bead `{0}` has no non-terminal assignment")]
    NotAssigned(String),

    #[error("TARGET_BUSY: pane `{0}` already has a non-terminal assignment")]
    TargetBusy(String),

    #[error("NO_IDLE_AGENT: no idle agent of type `{0}` is available")]
    NoIdleAgent(String),

    #[error(transparent)]
    Mux(#[from] ntm_mux::MuxError),

    #[error(transparent)]
    Store(#[from] ntm_store::AssignmentStoreError),
}

pub type Result<T> = std::result::Result<T, AssignError>;
pub type ReassignResult<T> = std::result::Result<T, ReassignError>;
