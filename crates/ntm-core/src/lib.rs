pub mod agent_type;
pub mod atomic_io;
pub mod config;
pub mod contracts;
pub mod error;
pub mod lockfile;
pub mod types;
pub mod worktree;
