pub mod driver;
pub mod error;
pub mod sanitize;
pub mod title;

pub use driver::{send_multiline, FakeMultiplexerDriver, MultiplexerDriver, PaneInfo, PaneListRetry, TmuxDriver};
pub use error::MuxError;
pub use title::{format_title, parse_title, ParsedTitle, USER_TYPE_TAG};
