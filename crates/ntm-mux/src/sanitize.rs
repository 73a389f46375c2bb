//! Name validation and `sendKeys` text sanitization (§4.1 constraints).

use std::sync::OnceLock;

use regex::Regex;

use crate::error::MuxError;

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-+@:]+$").expect("name regex is a compile-time constant"))
}

/// Validate a session or pane-title name against `[A-Za-z0-9_.\-+@:]+`.
pub fn validate_name(name: &str) -> Result<(), MuxError> {
    if name.is_empty() || !name_regex().is_match(name) {
        return Err(MuxError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Reject text destined for `sendKeys` that could break out of the pane
/// command: embedded newlines (the caller uses the documented `pressEnter`
/// flag instead) and raw ASCII control bytes / escape sequences.
pub fn sanitize_send_text(text: &str) -> Result<String, MuxError> {
    if text.contains('\n') || text.contains('\r') {
        return Err(MuxError::UnsafeText("embedded newline".into()));
    }
    if text.chars().any(|c| c.is_control() && c != '\t') {
        return Err(MuxError::UnsafeText("embedded control character".into()));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        assert!(validate_name("proj-1_build.v2@host:9").is_ok());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(validate_name("proj/with/slash").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn rejects_embedded_newline() {
        assert!(sanitize_send_text("line one\nline two").is_err());
    }

    #[test]
    fn rejects_control_sequences() {
        assert!(sanitize_send_text("\u{1b}[31mred\u{1b}[0m").is_err());
    }

    #[test]
    fn allows_tabs_and_plain_text() {
        assert!(sanitize_send_text("run\ttest --all").is_ok());
    }
}
