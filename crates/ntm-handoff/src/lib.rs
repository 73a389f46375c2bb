pub mod document;
pub mod error;
pub mod reader;
pub mod resume;

pub use document::{HandoffDocument, ReservationTransfer};
pub use error::HandoffError;
pub use reader::{handoffs_dir, load, locate_latest, LoadedHandoff};
pub use resume::{resume, ResumeMode, ResumeOptions, ResumeOutcome};
