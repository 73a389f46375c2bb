//! Cycle detection over the bead dependency DAG, promoted to its own module
//! so both the completion hook and a fake bead store's `check_cycles` can
//! reuse it (§9a). Graph is represented as `id -> [blocker ids]` adjacency,
//! never as direct references, per the cyclic-data design note.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Explicit DFS with a three-color array (white/gray/black) rather than
/// recursive back-edge detection via Rust references, since the graph is
/// keyed by bead id, not by pointer.
pub fn detect_cycles(edges: &HashMap<String, Vec<String>>) -> HashSet<String> {
    let mut color: HashMap<&str, Color> = edges.keys().map(|k| (k.as_str(), Color::White)).collect();
    let mut cyclic = HashSet::new();

    for start in edges.keys() {
        if color.get(start.as_str()) == Some(&Color::White) {
            visit(start, edges, &mut color, &mut cyclic);
        }
    }
    cyclic
}

fn visit<'a>(
    node: &'a str,
    edges: &'a HashMap<String, Vec<String>>,
    color: &mut HashMap<&'a str, Color>,
    cyclic: &mut HashSet<String>,
) {
    color.insert(node, Color::Gray);
    if let Some(neighbors) = edges.get(node) {
        for next in neighbors {
            match color.get(next.as_str()) {
                Some(Color::Gray) => {
                    cyclic.insert(node.to_string());
                    cyclic.insert(next.clone());
                }
                Some(Color::White) | None => {
                    if edges.contains_key(next.as_str()) {
                        visit(next, edges, color, cyclic);
                        if cyclic.contains(next.as_str()) {
                            cyclic.insert(node.to_string());
                        }
                    }
                }
                Some(Color::Black) => {}
            }
        }
    }
    color.insert(node, Color::Black);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(id, blockers)| (id.to_string(), blockers.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn acyclic_dag_has_no_cycles() {
        let edges = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert!(detect_cycles(&edges).is_empty());
    }

    #[test]
    fn direct_two_node_cycle_is_detected() {
        let edges = graph(&[("a", &["b"]), ("b", &["a"])]);
        let cyclic = detect_cycles(&edges);
        assert!(cyclic.contains("a"));
        assert!(cyclic.contains("b"));
    }

    #[test]
    fn longer_cycle_is_detected() {
        let edges = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let cyclic = detect_cycles(&edges);
        assert_eq!(cyclic.len(), 3);
    }

    #[test]
    fn node_outside_cycle_is_not_flagged() {
        let edges = graph(&[("a", &["b"]), ("b", &["a"]), ("isolated", &[])]);
        let cyclic = detect_cycles(&edges);
        assert!(!cyclic.contains("isolated"));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let edges = graph(&[("a", &["a"])]);
        assert!(detect_cycles(&edges).contains("a"));
    }
}
