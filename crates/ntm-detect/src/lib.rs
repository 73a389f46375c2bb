pub mod classify;

pub use classify::{classify, DetectedState};
