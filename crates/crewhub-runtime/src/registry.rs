//! Runtime Registry - materialized teams and agents keyed by name
//!
//! Never persisted. Every entry is derived from committed documents and is
//! rebuilt by the lifecycle manager whenever a dependency changes.

use crewhub_core::{AgentDoc, Error, TeamDoc};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ResolvedAgent {
    pub key: String,
    pub doc: AgentDoc,
}

#[derive(Debug, Clone)]
pub enum Member {
    Agent(Arc<ResolvedAgent>),
    Team(Arc<ResolvedTeam>),
}

impl Member {
    pub fn key(&self) -> &str {
        match self {
            Member::Agent(agent) => &agent.key,
            Member::Team(team) => &team.key,
        }
    }
}

/// A team whose members all resolved, in member order with duplicates collapsed.
#[derive(Debug)]
pub struct ResolvedTeam {
    pub key: String,
    pub doc: TeamDoc,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone)]
pub enum TeamStatus {
    Active(Arc<ResolvedTeam>),
    ConfigError(String),
}

impl TeamStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TeamStatus::Active(_) => "active",
            TeamStatus::ConfigError(_) => "config_error",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            TeamStatus::Active(_) => None,
            TeamStatus::ConfigError(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Default)]
pub struct RuntimeRegistry {
    agents: HashMap<String, Arc<ResolvedAgent>>,
    teams: HashMap<String, TeamStatus>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team(&self, key: &str) -> Option<&TeamStatus> {
        self.teams.get(key)
    }

    pub fn set_agent(&mut self, key: &str, doc: AgentDoc) {
        self.agents.insert(
            key.to_string(),
            Arc::new(ResolvedAgent {
                key: key.to_string(),
                doc,
            }),
        );
    }

    pub fn remove_agent(&mut self, key: &str) {
        self.agents.remove(key);
    }

    pub fn remove_team(&mut self, key: &str) {
        self.teams.remove(key);
    }

    pub fn mark_error(&mut self, key: &str, reason: impl Into<String>) {
        self.teams
            .insert(key.to_string(), TeamStatus::ConfigError(reason.into()));
    }

    /// Materialize `key` from `doc`. Member teams must already be registered
    /// (callers rebuild in dependency order). A key naming both a registered
    /// team and an agent resolves to the team. Returns the new status.
    pub fn rebuild_team(&mut self, key: &str, doc: &TeamDoc) -> &TeamStatus {
        let status = self.resolve(key, doc);
        self.teams.insert(key.to_string(), status);
        &self.teams[key]
    }

    fn resolve(&self, key: &str, doc: &TeamDoc) -> TeamStatus {
        let mut members = Vec::with_capacity(doc.members.len());
        for member in doc.unique_members() {
            if let Some(status) = self.teams.get(member) {
                match status {
                    TeamStatus::Active(team) => members.push(Member::Team(Arc::clone(team))),
                    TeamStatus::ConfigError(_) => {
                        return TeamStatus::ConfigError(format!(
                            "member team '{}' is in config_error",
                            member
                        ))
                    }
                }
            } else if let Some(agent) = self.agents.get(member) {
                members.push(Member::Agent(Arc::clone(agent)));
            } else {
                return TeamStatus::ConfigError(
                    Error::UnresolvedReference {
                        team: key.to_string(),
                        member: member.to_string(),
                    }
                    .to_string(),
                );
            }
        }
        TeamStatus::Active(Arc::new(ResolvedTeam {
            key: key.to_string(),
            doc: doc.clone(),
            members,
        }))
    }
}
