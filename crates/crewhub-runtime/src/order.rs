//! Cycle Detector & Topological Orderer
//!
//! Iterative depth-first search with three marks. Roots and neighbours are
//! visited in key order so the order and any reported cycle are reproducible.

use crate::graph::TeamGraph;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Dependencies-first order over every node of `graph`, or one concrete
/// cycle as a closed key path (`["a", "b", "a"]`; a self-member is `["a", "a"]`).
pub fn topo_order(graph: &TeamGraph) -> Result<Vec<String>, Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(graph.len());
    let mut order = Vec::with_capacity(graph.len());

    for root in graph.nodes() {
        if marks.contains_key(root) {
            continue;
        }
        marks.insert(root, Mark::InProgress);
        let mut stack = vec![(root, neighbours(graph, root))];

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            let next = pending.next();
            match next {
                Some(next) => match marks.get(next).copied() {
                    None => {
                        marks.insert(next, Mark::InProgress);
                        stack.push((next, neighbours(graph, next)));
                    }
                    Some(Mark::InProgress) => {
                        let start = stack
                            .iter()
                            .position(|(key, _)| *key == next)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|(key, _)| key.to_string()).collect();
                        cycle.push(next.to_string());
                        return Err(cycle);
                    }
                    Some(Mark::Done) => {}
                },
                None => {
                    marks.insert(node, Mark::Done);
                    order.push(node.to_string());
                    stack.pop();
                }
            }
        }
    }

    Ok(order)
}

fn neighbours<'g>(graph: &'g TeamGraph, node: &str) -> Box<dyn Iterator<Item = &'g str> + 'g> {
    match graph.members(node) {
        Some(members) => Box::new(members.iter().map(String::as_str).filter(|m| graph.contains(m))),
        None => Box::new(std::iter::empty()),
    }
}

/// Order what can be ordered and set cycles aside. Every cycle found is
/// removed from the graph and the search repeats until the remainder is
/// acyclic. Returns the order of the remainder and the cycles, in discovery order.
pub fn peel_cycles(graph: &TeamGraph) -> (Vec<String>, Vec<Vec<String>>) {
    let mut remaining = graph.clone();
    let mut cycles = Vec::new();
    loop {
        match topo_order(&remaining) {
            Ok(order) => return (order, cycles),
            Err(cycle) => {
                let nodes: BTreeSet<String> = cycle.iter().cloned().collect();
                remaining = remaining.without(&nodes);
                cycles.push(cycle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewhub_core::TeamDoc;

    /// `("a", "b c")` declares team `a` with members `b` and `c`.
    fn graph(edges: &[(&str, &str)]) -> TeamGraph {
        let docs: Vec<(String, TeamDoc)> = edges
            .iter()
            .map(|(key, members)| {
                (
                    key.to_string(),
                    TeamDoc {
                        team_name: key.to_string(),
                        members: members.split_whitespace().map(String::from).collect(),
                        description: None,
                        instructions: None,
                        success_criteria: None,
                    },
                )
            })
            .collect();
        TeamGraph::build(docs.iter().map(|(k, d)| (k.as_str(), d)), |_| false)
    }

    fn position(order: &[String], key: &str) -> usize {
        order.iter().position(|k| k == key).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let g = graph(&[("a", "b c"), ("b", "d"), ("c", "d"), ("d", ""), ("e", "a")]);
        let order = topo_order(&g).unwrap();
        assert_eq!(order.len(), 5);
        for (parent, child) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("e", "a")] {
            assert!(position(&order, child) < position(&order, parent), "{} before {}", child, parent);
        }
    }

    #[test]
    fn order_is_reproducible() {
        let g = graph(&[("z", ""), ("m", ""), ("a", "m")]);
        assert_eq!(topo_order(&g).unwrap(), vec!["m", "a", "z"]);
    }

    #[test]
    fn self_member_is_one_node_cycle() {
        let g = graph(&[("a", "a")]);
        assert_eq!(topo_order(&g).unwrap_err(), vec!["a", "a"]);
    }

    #[test]
    fn three_node_cycle_path() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a")]);
        assert_eq!(topo_order(&g).unwrap_err(), vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn cycle_below_acyclic_prefix() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "b")]);
        assert_eq!(topo_order(&g).unwrap_err(), vec!["b", "c", "b"]);
    }

    #[test]
    fn peel_sets_cycles_aside() {
        let g = graph(&[("a", "b"), ("b", "a"), ("c", ""), ("d", "d"), ("e", "a c")]);
        let (order, cycles) = peel_cycles(&g);
        assert_eq!(cycles, vec![vec!["a", "b", "a"], vec!["d", "d"]]);
        assert_eq!(order, vec!["c", "e"]);
    }

    #[test]
    fn empty_graph() {
        assert!(topo_order(&TeamGraph::default()).unwrap().is_empty());
    }
}
