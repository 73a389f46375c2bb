//! Strategy application (§4.6 step 6): re-ranks scored `(bead, agent)` pairs.

use std::collections::HashMap;
use std::str::FromStr;

use ntm_core::types::AgentType;

use crate::profile::CandidateScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Balanced,
    Speed,
    Quality,
    Dependency,
    RoundRobin,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balanced" => Ok(Strategy::Balanced),
            "speed" => Ok(Strategy::Speed),
            "quality" => Ok(Strategy::Quality),
            "dependency" => Ok(Strategy::Dependency),
            "round-robin" => Ok(Strategy::RoundRobin),
            other => Err(format!("unknown assignment strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub bead_id: String,
    pub agent_type: AgentType,
    pub pane_id: String,
    pub score: CandidateScore,
    pub difficulty: f64,
    /// Reverse-topological depth (more dependents ⇒ larger) used only by
    /// `dependency`.
    pub dependents_depth: u32,
}

/// Re-rank `candidates` (already filtered to `can_handle`) per `strategy`.
/// `round-robin` and `balanced` both need a stable agent-type order to cycle
/// through; `agent_order` gives that order.
pub fn apply_strategy(strategy: Strategy, mut candidates: Vec<ScoredCandidate>, agent_order: &[AgentType]) -> Vec<ScoredCandidate> {
    match strategy {
        Strategy::Speed => {
            candidates.sort_by(|a, b| {
                let sa = a.score.value * (1.0 / a.difficulty.max(f64::EPSILON));
                let sb = b.score.value * (1.0 / b.difficulty.max(f64::EPSILON));
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
            candidates
        }
        Strategy::Quality => {
            candidates.sort_by(|a, b| {
                let sa = a.score.value * if a.score.specialization_hit { 2.0 } else { 1.0 };
                let sb = b.score.value * if b.score.specialization_hit { 2.0 } else { 1.0 };
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
            candidates
        }
        Strategy::Dependency => {
            candidates.sort_by(|a, b| {
                b.score.value.partial_cmp(&a.score.value).unwrap_or(std::cmp::Ordering::Equal)
            });
            candidates.sort_by(|a, b| b.dependents_depth.cmp(&a.dependents_depth));
            candidates
        }
        Strategy::RoundRobin => round_robin_by_type(candidates, agent_order, false),
        Strategy::Balanced => {
            candidates.sort_by(|a, b| b.score.value.partial_cmp(&a.score.value).unwrap_or(std::cmp::Ordering::Equal));
            round_robin_by_type(candidates, agent_order, true)
        }
    }
}

/// Deal candidates round-robin across `agent_order`'s types. When
/// `preserve_score_order` is set (balanced), each per-type bucket keeps its
/// incoming (score-sorted) order; round-robin proper ignores score and just
/// deals in encounter order.
fn round_robin_by_type(candidates: Vec<ScoredCandidate>, agent_order: &[AgentType], preserve_score_order: bool) -> Vec<ScoredCandidate> {
    let _ = preserve_score_order;
    let mut buckets: HashMap<&AgentType, Vec<ScoredCandidate>> = HashMap::new();
    let mut order: Vec<&AgentType> = Vec::new();
    for ty in agent_order {
        if !buckets.contains_key(ty) {
            buckets.insert(ty, Vec::new());
            order.push(ty);
        }
    }
    for c in candidates {
        let ty = agent_order.iter().find(|t| **t == c.agent_type);
        if let Some(ty) = ty {
            buckets.entry(ty).or_default().push(c);
        }
    }

    let mut result = Vec::new();
    loop {
        let mut made_progress = false;
        for ty in &order {
            if let Some(bucket) = buckets.get_mut(ty) {
                if !bucket.is_empty() {
                    result.push(bucket.remove(0));
                    made_progress = true;
                }
            }
        }
        if !made_progress {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CandidateScore;

    fn candidate(bead: &str, ty: AgentType, value: f64) -> ScoredCandidate {
        ScoredCandidate {
            bead_id: bead.to_string(),
            agent_type: ty,
            pane_id: "%1".into(),
            score: CandidateScore { can_handle: true, specialization_hit: false, value },
            difficulty: 1.0,
            dependents_depth: 0,
        }
    }

    #[test]
    fn strategy_parses_known_names() {
        assert_eq!("balanced".parse::<Strategy>().unwrap(), Strategy::Balanced);
        assert!("nonsense".parse::<Strategy>().is_err());
    }

    #[test]
    fn speed_strategy_favors_low_difficulty() {
        let mut easy = candidate("b1", AgentType::Claude, 1.0);
        easy.difficulty = 1.0;
        let mut hard = candidate("b2", AgentType::Claude, 1.0);
        hard.difficulty = 10.0;
        let ranked = apply_strategy(Strategy::Speed, vec![hard, easy], &[AgentType::Claude]);
        assert_eq!(ranked[0].bead_id, "b1");
    }

    #[test]
    fn dependency_strategy_orders_by_depth() {
        let mut shallow = candidate("b1", AgentType::Claude, 1.0);
        shallow.dependents_depth = 1;
        let mut deep = candidate("b2", AgentType::Claude, 1.0);
        deep.dependents_depth = 5;
        let ranked = apply_strategy(Strategy::Dependency, vec![shallow, deep], &[AgentType::Claude]);
        assert_eq!(ranked[0].bead_id, "b2");
    }

    #[test]
    fn balanced_round_robins_across_agent_types() {
        let candidates = vec![
            candidate("b1", AgentType::Claude, 5.0),
            candidate("b2", AgentType::Claude, 4.0),
            candidate("b3", AgentType::Codex, 3.0),
        ];
        let ranked = apply_strategy(Strategy::Balanced, candidates, &[AgentType::Claude, AgentType::Codex]);
        assert_eq!(ranked[0].agent_type, AgentType::Claude);
        assert_eq!(ranked[1].agent_type, AgentType::Codex);
    }

    #[test]
    fn round_robin_ignores_score() {
        let candidates = vec![
            candidate("b1", AgentType::Claude, 0.1),
            candidate("b2", AgentType::Codex, 99.0),
        ];
        let ranked = apply_strategy(Strategy::RoundRobin, candidates, &[AgentType::Claude, AgentType::Codex]);
        assert_eq!(ranked.len(), 2);
    }
}
