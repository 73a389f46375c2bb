pub mod error;
pub mod state;
pub mod tracker;

pub use error::RateLimitError;
pub use state::RateLimitState;
pub use tracker::RateLimitTracker;
