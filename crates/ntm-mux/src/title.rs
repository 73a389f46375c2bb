//! Pane title grammar (§6): `session "__" type "_" index ("_" variant)?`.
//! Promoted to its own module per SPEC_FULL §9a so Testable Property 1
//! (title round-trip) can be exercised directly against it.

use ntm_core::types::AgentType;
use regex::Regex;
use std::sync::OnceLock;

/// The pane type tag for the one optional non-agent pane a spawn may create
/// (`opts.userPane`). The grammar's `plugin-name` alternative covers any
/// bare identifier, so `"user"` is a valid type tag under it.
pub const USER_TYPE_TAG: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub session: String,
    pub type_tag: String,
    pub index: u32,
    pub variant: Option<String>,
}

impl ParsedTitle {
    pub fn agent_type(&self) -> Option<AgentType> {
        if self.type_tag == USER_TYPE_TAG {
            None
        } else {
            Some(self.type_tag.parse().expect("AgentType::from_str is infallible"))
        }
    }
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<session>[A-Za-z0-9_.\-+@:]+)__(?P<type>[A-Za-z0-9_.\-+@:]+)_(?P<index>\d+)(?:_(?P<variant>[A-Za-z0-9_.\-+@:/]+))?$")
            .expect("title grammar regex is a compile-time constant")
    })
}

/// Compose the canonical pane title `session__type_index[_variant]`.
///
/// # Panics
/// Panics if `session` or `type_tag` contain characters outside
/// `[A-Za-z0-9_.\-+@:]` — callers must validate names before formatting
/// (see [`crate::sanitize::validate_name`]).
pub fn format_title(session: &str, type_tag: &str, index: u32, variant: Option<&str>) -> String {
    match variant {
        Some(v) => format!("{session}__{type_tag}_{index}_{v}"),
        None => format!("{session}__{type_tag}_{index}"),
    }
}

/// Parse a pane title losslessly into its component tuple. Returns `None`
/// for anything not matching the grammar exactly.
pub fn parse_title(title: &str) -> Option<ParsedTitle> {
    let caps = title_regex().captures(title)?;
    let index: u32 = caps.name("index")?.as_str().parse().ok()?;
    Some(ParsedTitle {
        session: caps.name("session")?.as_str().to_string(),
        type_tag: caps.name("type")?.as_str().to_string(),
        index,
        variant: caps.name("variant").map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_without_variant() {
        let title = format_title("proj", "cc", 1, None);
        assert_eq!(title, "proj__cc_1");
        let parsed = parse_title(&title).unwrap();
        assert_eq!(parsed.session, "proj");
        assert_eq!(parsed.type_tag, "cc");
        assert_eq!(parsed.index, 1);
        assert_eq!(parsed.variant, None);
    }

    #[test]
    fn round_trips_with_variant() {
        let title = format_title("proj", "cod", 1, Some("o4"));
        let parsed = parse_title(&title).unwrap();
        assert_eq!(parsed.variant, Some("o4".to_string()));
        assert_eq!(parsed.agent_type(), Some(AgentType::Codex));
    }

    #[test]
    fn user_pane_type_tag_has_no_agent_type() {
        let title = format_title("proj", USER_TYPE_TAG, 1, None);
        let parsed = parse_title(&title).unwrap();
        assert_eq!(parsed.agent_type(), None);
    }

    #[test]
    fn rejects_malformed_titles() {
        assert!(parse_title("no-double-underscore").is_none());
        assert!(parse_title("proj__cc_not-a-number").is_none());
    }

    #[test]
    fn property_title_round_trip_for_arbitrary_valid_tuples() {
        let cases: &[(&str, &str, u32, Option<&str>)] = &[
            ("sess-1", "cc", 1, None),
            ("sess.2", "gmi", 42, Some("pro")),
            ("a@b:c", "plugin-x", 7, Some("variant.with-dots")),
        ];
        for (session, ty, index, variant) in cases {
            let title = format_title(session, ty, *index, *variant);
            let parsed = parse_title(&title).unwrap();
            assert_eq!(parsed.session, *session);
            assert_eq!(parsed.type_tag, *ty);
            assert_eq!(parsed.index, *index);
            assert_eq!(parsed.variant.as_deref(), *variant);
        }
    }
}
