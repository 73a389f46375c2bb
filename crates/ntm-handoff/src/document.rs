//! The on-disk handoff document shape (§4.7): one YAML file per handoff,
//! grounded on the `RecoveryContext` already used to carry forward-state at
//! spawn time (ntm-core::types) — a handoff is just that context plus the
//! roster and mail-transfer instructions needed to rebuild it in a new
//! session.

use std::collections::HashMap;

use ntm_core::types::RecoveryContext;
use serde::{Deserialize, Serialize};

/// Instructs the resume operation to move file reservations held by a prior
/// agent identity over to the new session's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationTransfer {
    pub from_identity: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffDocument {
    pub session: String,
    /// Keyed by title tag (`cc`, `cod`, `gmi`, ...), same grammar as
    /// `AgentType::title_tag`/`FromStr`.
    #[serde(default)]
    pub agent_counts: HashMap<String, u32>,
    #[serde(default)]
    pub context: RecoveryContext,
    #[serde(default)]
    pub reservation_transfer: Option<ReservationTransfer>,
}

impl HandoffDocument {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_yaml() {
        let mut agent_counts = HashMap::new();
        agent_counts.insert("cc".to_string(), 2);
        let doc = HandoffDocument {
            session: "proj".to_string(),
            agent_counts,
            context: RecoveryContext {
                in_progress: vec!["finish the parser".to_string()],
                ..Default::default()
            },
            reservation_transfer: Some(ReservationTransfer {
                from_identity: "agent-old".to_string(),
                paths: vec!["src/main.rs".to_string()],
            }),
        };
        let yaml = doc.to_yaml().unwrap();
        let back = HandoffDocument::from_yaml(&yaml).unwrap();
        assert_eq!(back.session, "proj");
        assert_eq!(back.agent_counts.get("cc"), Some(&2));
        assert_eq!(back.reservation_transfer.unwrap().from_identity, "agent-old");
    }

    #[test]
    fn missing_optional_fields_default() {
        let doc = HandoffDocument::from_yaml("session: proj\n").unwrap();
        assert!(doc.agent_counts.is_empty());
        assert!(doc.reservation_transfer.is_none());
        assert!(doc.context.in_progress.is_empty());
    }
}
