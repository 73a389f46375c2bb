pub mod assignment_store;
pub mod cycles;
pub mod error;

pub use assignment_store::{AssignmentStore, DependencyAwareResult};
pub use error::AssignmentStoreError;
