//! Graph Builder - team definitions to an adjacency index
//!
//! Nodes are team keys. An edge `T -> M` exists for every member `M` of `T`
//! that names a team. Agent members are leaves and produce no edge; member
//! keys naming neither a team nor an agent are kept as `unresolved`
//! annotations on their owning node.

use crewhub_core::TeamDoc;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeamGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
    unresolved: BTreeMap<String, Vec<String>>,
}

impl TeamGraph {
    /// Build from a set of team definitions. A member key naming both a team
    /// and an agent resolves to the team.
    pub fn build<'a>(
        teams: impl IntoIterator<Item = (&'a str, &'a TeamDoc)>,
        is_agent: impl Fn(&str) -> bool,
    ) -> Self {
        let teams: Vec<(&str, &TeamDoc)> = teams.into_iter().collect();
        let team_keys: BTreeSet<&str> = teams.iter().map(|(key, _)| *key).collect();

        let mut graph = Self::default();
        for (key, doc) in &teams {
            let mut edges = BTreeSet::new();
            let mut unresolved = Vec::new();
            for member in doc.unique_members() {
                if team_keys.contains(member) {
                    edges.insert(member.to_string());
                } else if !is_agent(member) {
                    unresolved.push(member.to_string());
                }
            }
            graph.edges.insert(key.to_string(), edges);
            if !unresolved.is_empty() {
                graph.unresolved.insert(key.to_string(), unresolved);
            }
        }
        graph
    }

    /// Team keys in lexicographic order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn contains(&self, team: &str) -> bool {
        self.edges.contains_key(team)
    }

    pub(crate) fn len(&self) -> usize {
        self.edges.len()
    }

    /// Team-typed members of `team`, sorted.
    pub fn members(&self, team: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(team)
    }

    /// Member keys of `team` that name neither a team nor an agent, in member order.
    pub fn unresolved(&self, team: &str) -> &[String] {
        self.unresolved.get(team).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Copy of the graph with `removed` nodes and every edge into them dropped.
    pub fn without(&self, removed: &BTreeSet<String>) -> Self {
        let edges = self
            .edges
            .iter()
            .filter(|(key, _)| !removed.contains(*key))
            .map(|(key, members)| {
                let kept = members.difference(removed).cloned().collect();
                (key.clone(), kept)
            })
            .collect();
        let unresolved = self
            .unresolved
            .iter()
            .filter(|(key, _)| !removed.contains(*key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { edges, unresolved }
    }
}

/// Member key to the teams listing it, for every kind of member
/// (teams, agents and unresolved keys alike).
#[derive(Clone, Debug, Default)]
pub struct ReverseIndex {
    parents: BTreeMap<String, BTreeSet<String>>,
}

impl ReverseIndex {
    pub fn from_teams<'a>(teams: impl IntoIterator<Item = (&'a str, &'a TeamDoc)>) -> Self {
        let mut index = Self::default();
        for (key, doc) in teams {
            index.insert_team(key, doc);
        }
        index
    }

    /// Record the edges of a newly committed team.
    pub fn insert_team(&mut self, team: &str, doc: &TeamDoc) {
        for member in doc.unique_members() {
            self.parents
                .entry(member.to_string())
                .or_default()
                .insert(team.to_string());
        }
    }

    /// Forget the edges of a team as it was committed before.
    pub fn remove_team(&mut self, team: &str, doc: &TeamDoc) {
        for member in doc.unique_members() {
            if let Some(parents) = self.parents.get_mut(member) {
                parents.remove(team);
                if parents.is_empty() {
                    self.parents.remove(member);
                }
            }
        }
    }

    /// Teams directly listing `member`.
    pub fn parents(&self, member: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(member)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Every team that transitively contains `key`, excluding `key` itself
    /// unless it sits on a cycle.
    pub fn dependents_closure(&self, key: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([key]);
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(current) {
                if seen.insert(parent.to_string()) {
                    queue.push_back(parent);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(members: &[&str]) -> TeamDoc {
        TeamDoc {
            team_name: "t".into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            description: None,
            instructions: None,
            success_criteria: None,
        }
    }

    #[test]
    fn edges_only_for_team_members() {
        let a = team(&["b", "writer", "ghost", "b"]);
        let b = team(&["writer"]);
        let graph = TeamGraph::build([("a", &a), ("b", &b)], |k| k == "writer");

        assert_eq!(graph.members("a").unwrap().len(), 1);
        assert!(graph.members("a").unwrap().contains("b"));
        assert_eq!(graph.unresolved("a"), ["ghost".to_string()]);
        assert!(graph.unresolved("b").is_empty());
    }

    #[test]
    fn team_wins_over_agent_with_same_key() {
        let a = team(&["dup"]);
        let dup = team(&[]);
        let graph = TeamGraph::build([("a", &a), ("dup", &dup)], |k| k == "dup");
        assert!(graph.members("a").unwrap().contains("dup"));
    }

    #[test]
    fn reverse_index_tracks_commits() {
        let a = team(&["b"]);
        let b = team(&["writer"]);
        let mut index = ReverseIndex::from_teams([("a", &a), ("b", &b)]);

        assert_eq!(
            index.dependents_closure("writer"),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );

        index.remove_team("a", &a);
        index.insert_team("a", &team(&["writer"]));
        assert!(index.parents("b").next().is_none());
        assert_eq!(index.parents("writer").count(), 2);
    }

    #[test]
    fn without_drops_nodes_and_incoming_edges() {
        let a = team(&["b"]);
        let b = team(&["a"]);
        let c = team(&["a"]);
        let graph = TeamGraph::build([("a", &a), ("b", &b), ("c", &c)], |_| false);
        let pruned = graph.without(&BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(pruned.nodes().collect::<Vec<_>>(), vec!["c"]);
        assert!(pruned.members("c").unwrap().is_empty());
    }
}
