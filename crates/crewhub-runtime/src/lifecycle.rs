//! Lifecycle Manager - transactional create/update/delete of agents and teams
//!
//! All graph state sits behind one `RwLock`. Mutations hold the write lock
//! across validate, store write and rebuild; a rejected or failed mutation
//! returns before touching the in-memory state, so there is nothing to undo.
//! Persona and product documents are not part of the graph and only take a
//! small mutex that serializes their check-then-write.

use crate::graph::{ReverseIndex, TeamGraph};
use crate::order::{peel_cycles, topo_order};
use crate::registry::{ResolvedTeam, RuntimeRegistry, TeamStatus};
use crewhub_core::{
    format_cycle, parse_document, validate_key, AgentDoc, Document, EntityKind, Error, PersonaDoc,
    ProductDoc, Result, TeamDoc,
};
use crewhub_store::EntityStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Status line of one team, as shown by `list_teams`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TeamSummary {
    pub team_key: String,
    pub team_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A team whose status was recomputed by a mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AffectedTeam {
    pub team_key: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of a committed mutation.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MutationReport {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub affected_teams: Vec<AffectedTeam>,
}

impl MutationReport {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            affected_teams: Vec::new(),
        }
    }
}

/// Listing row for personas, products and agents.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum EntitySummary {
    Persona {
        persona_key: String,
        name: String,
        role: String,
        goals: Vec<String>,
        profile_summary: String,
    },
    Product {
        product_key: String,
        product_name: String,
        description: String,
    },
    Agent {
        agent_key: String,
        name: String,
        role: String,
    },
}

#[derive(Default)]
struct GraphState {
    teams: BTreeMap<String, TeamDoc>,
    agents: BTreeMap<String, AgentDoc>,
    reverse: ReverseIndex,
    /// Dependencies-first order over every team not on a stored cycle.
    order: Vec<String>,
    /// Teams set aside because they sit on a cycle found at load time.
    quarantined: BTreeMap<String, String>,
    /// Stored team documents that do not parse: key to (team name, reason).
    /// They hold their key, stay in `config_error` and can only be updated or deleted.
    malformed: BTreeMap<String, (String, String)>,
    registry: RuntimeRegistry,
}

impl GraphState {
    fn is_agent(&self, key: &str) -> bool {
        self.agents.contains_key(key)
    }

    fn has_team(&self, key: &str) -> bool {
        self.teams.contains_key(key) || self.malformed.contains_key(key)
    }

    /// Recompute order and quarantine from the committed documents.
    fn reindex(&mut self) {
        let agents = &self.agents;
        let graph = TeamGraph::build(
            self.teams.iter().map(|(k, d)| (k.as_str(), d)),
            |key| agents.contains_key(key),
        );
        let (order, cycles) = peel_cycles(&graph);
        self.order = order;
        self.quarantined.clear();
        for cycle in cycles {
            let reason = format!("dependency cycle: {}", format_cycle(&cycle));
            for key in cycle {
                self.quarantined.entry(key).or_insert_with(|| reason.clone());
            }
        }
    }

    /// Rebuild every team.
    fn rebuild_all(&mut self) -> Vec<AffectedTeam> {
        for (key, reason) in &self.quarantined {
            warn!("Team '{}' quarantined: {}", key, reason);
            self.registry.mark_error(key, reason.clone());
        }
        let all: BTreeSet<String> = self.order.iter().cloned().collect();
        let mut affected = self.rebuild(&all);
        affected.extend(self.quarantined.iter().map(|(key, reason)| AffectedTeam {
            team_key: key.clone(),
            status: "config_error",
            reason: Some(reason.clone()),
        }));
        affected.sort_by(|a, b| a.team_key.cmp(&b.team_key));
        affected
    }

    /// Rebuild `keys` in dependency order.
    fn rebuild(&mut self, keys: &BTreeSet<String>) -> Vec<AffectedTeam> {
        let mut affected = Vec::new();
        for key in self.order.iter().filter(|k| keys.contains(*k)) {
            let Some(doc) = self.teams.get(key) else { continue };
            let status = self.registry.rebuild_team(key, doc);
            match status {
                TeamStatus::Active(_) => debug!("Team '{}' active", key),
                TeamStatus::ConfigError(reason) => warn!("Team '{}' degraded: {}", key, reason),
            }
            affected.push(AffectedTeam {
                team_key: key.clone(),
                status: status.label(),
                reason: status.reason().map(String::from),
            });
        }
        affected
    }

    /// Rebuild after a commit touching `changed`. Falls back to a full
    /// rebuild while any stored cycle is quarantined.
    fn refresh(&mut self, changed: &str, include_changed: bool) -> Vec<AffectedTeam> {
        let had_quarantine = !self.quarantined.is_empty();
        self.reindex();
        if had_quarantine || !self.quarantined.is_empty() {
            return self.rebuild_all();
        }
        let mut keys = self.reverse.dependents_closure(changed);
        if include_changed {
            keys.insert(changed.to_string());
        }
        self.rebuild(&keys)
    }

    /// Reject a candidate team set that contains a cycle. Teams already
    /// quarantined are left out, except `changed` itself.
    fn check_candidate(&self, changed: &str, candidate: &TeamDoc) -> Result<()> {
        let teams = self
            .teams
            .iter()
            .filter(|(key, _)| key.as_str() != changed)
            .filter(|(key, _)| !self.quarantined.contains_key(key.as_str()))
            .map(|(k, d)| (k.as_str(), d))
            .chain(std::iter::once((changed, candidate)));
        let graph = TeamGraph::build(teams, |key| self.is_agent(key));
        topo_order(&graph).map(|_| ()).map_err(|cycle| {
            warn!("Rejected change to team '{}': cycle {}", changed, format_cycle(&cycle));
            Error::CycleDetected { cycle }
        })
    }
}

/// Owns the graph lock, the committed documents, the graph indexes and the
/// runtime registry.
pub struct TeamManager {
    store: Arc<dyn EntityStore>,
    state: RwLock<GraphState>,
    leaf_lock: Mutex<()>,
}

impl TeamManager {
    /// Load every agent and team from `store` and materialize all teams.
    /// Stored cycles do not fail the load; their teams start in `config_error`.
    pub async fn load(store: Arc<dyn EntityStore>) -> Result<Self> {
        let mut state = GraphState::default();

        for (key, raw) in store.list(EntityKind::Agent).await? {
            match parse_document::<AgentDoc>(EntityKind::Agent, &raw) {
                Ok(doc) => {
                    state.registry.set_agent(&key, doc.clone());
                    state.agents.insert(key, doc);
                }
                Err(e) => error!("Skipping stored agent '{}': {}", key, e),
            }
        }
        for (key, raw) in store.list(EntityKind::Team).await? {
            match parse_document::<TeamDoc>(EntityKind::Team, &raw) {
                Ok(doc) => {
                    state.teams.insert(key, doc);
                }
                Err(e) => {
                    error!("Stored team '{}' is malformed: {}", key, e);
                    let name = raw
                        .get("team_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or(key.as_str())
                        .to_string();
                    let reason = format!("malformed team document: {}", e);
                    state.registry.mark_error(&key, reason.clone());
                    state.malformed.insert(key, (name, reason));
                }
            }
        }

        state.reverse = ReverseIndex::from_teams(state.teams.iter().map(|(k, d)| (k.as_str(), d)));
        state.reindex();
        let statuses = state.rebuild_all();
        let active = statuses.iter().filter(|t| t.status == "active").count();
        info!(
            "Loaded {} agents and {} teams ({} active, {} in config_error)",
            state.agents.len(),
            state.teams.len() + state.malformed.len(),
            active,
            statuses.len() + state.malformed.len() - active
        );

        Ok(Self {
            store,
            state: RwLock::new(state),
            leaf_lock: Mutex::new(()),
        })
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    pub async fn create_agent(&self, key: &str, data: Document) -> Result<MutationReport> {
        validate_key(EntityKind::Agent, key)?;
        EntityKind::Agent.schema().validate(&data)?;
        let doc: AgentDoc = parse_document(EntityKind::Agent, &data)?;

        let mut state = self.state.write().await;
        if state.agents.contains_key(key) {
            return Err(Error::already_exists(EntityKind::Agent, key));
        }
        self.store.put(EntityKind::Agent, key, data).await?;

        state.registry.set_agent(key, doc.clone());
        state.agents.insert(key.to_string(), doc);
        let affected = state.refresh(key, false);
        info!("Agent '{}' created; {} team(s) rebuilt", key, affected.len());

        Ok(MutationReport {
            message: format!("Agent '{}' created.", key),
            affected_teams: affected,
        })
    }

    pub async fn update_agent(&self, key: &str, patch: Document) -> Result<MutationReport> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(key) {
            return Err(Error::not_found(EntityKind::Agent, key));
        }
        let current = self.store.get(EntityKind::Agent, key).await?;
        let merged = EntityKind::Agent.schema().merge(&current, &patch)?;
        if merged == current {
            debug!("Agent '{}' unchanged", key);
            return Ok(MutationReport::new(format!("Agent '{}' unchanged.", key)));
        }
        let doc: AgentDoc = parse_document(EntityKind::Agent, &merged)?;
        self.store.put(EntityKind::Agent, key, merged).await?;

        state.registry.set_agent(key, doc.clone());
        state.agents.insert(key.to_string(), doc);
        let affected = state.refresh(key, false);
        info!("Agent '{}' updated; {} team(s) rebuilt", key, affected.len());

        Ok(MutationReport {
            message: format!("Agent '{}' updated.", key),
            affected_teams: affected,
        })
    }

    pub async fn delete_agent(&self, key: &str) -> Result<MutationReport> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(key) {
            return Err(Error::not_found(EntityKind::Agent, key));
        }
        self.store.delete(EntityKind::Agent, key).await?;

        state.registry.remove_agent(key);
        state.agents.remove(key);
        let affected = state.refresh(key, false);
        info!("Agent '{}' deleted; {} team(s) rebuilt", key, affected.len());

        Ok(MutationReport {
            message: format!("Agent '{}' deleted.", key),
            affected_teams: affected,
        })
    }

    // -----------------------------------------------------------------------
    // Teams
    // -----------------------------------------------------------------------

    pub async fn create_team(&self, key: &str, data: Document) -> Result<MutationReport> {
        validate_key(EntityKind::Team, key)?;
        EntityKind::Team.schema().validate(&data)?;
        let doc: TeamDoc = parse_document(EntityKind::Team, &data)?;

        let mut state = self.state.write().await;
        if state.has_team(key) {
            return Err(Error::already_exists(EntityKind::Team, key));
        }
        state.check_candidate(key, &doc)?;
        self.store.put(EntityKind::Team, key, data).await?;

        state.reverse.insert_team(key, &doc);
        state.teams.insert(key.to_string(), doc);
        let affected = state.refresh(key, true);
        info!("Team '{}' created; {} team(s) rebuilt", key, affected.len());

        Ok(MutationReport {
            message: format!("Team '{}' created.", key),
            affected_teams: affected,
        })
    }

    pub async fn update_team(&self, key: &str, patch: Document) -> Result<MutationReport> {
        let mut state = self.state.write().await;
        if !state.has_team(key) {
            return Err(Error::not_found(EntityKind::Team, key));
        }
        let old = state.teams.get(key).cloned();
        let current = self.store.get(EntityKind::Team, key).await?;
        let merged = EntityKind::Team.schema().merge(&current, &patch)?;
        if merged == current {
            debug!("Team '{}' unchanged", key);
            return Ok(MutationReport::new(format!("Team '{}' unchanged.", key)));
        }
        let doc: TeamDoc = parse_document(EntityKind::Team, &merged)?;
        state.check_candidate(key, &doc)?;
        self.store.put(EntityKind::Team, key, merged).await?;

        if let Some(old) = &old {
            state.reverse.remove_team(key, old);
        }
        state.reverse.insert_team(key, &doc);
        state.teams.insert(key.to_string(), doc);
        state.malformed.remove(key);
        let affected = state.refresh(key, true);
        info!("Team '{}' updated; {} team(s) rebuilt", key, affected.len());

        Ok(MutationReport {
            message: format!("Team '{}' updated.", key),
            affected_teams: affected,
        })
    }

    pub async fn delete_team(&self, key: &str) -> Result<MutationReport> {
        let mut state = self.state.write().await;
        if !state.has_team(key) {
            return Err(Error::not_found(EntityKind::Team, key));
        }
        self.store.delete(EntityKind::Team, key).await?;

        if let Some(old) = state.teams.remove(key) {
            state.reverse.remove_team(key, &old);
        }
        state.malformed.remove(key);
        state.registry.remove_team(key);
        let affected = state.refresh(key, false);
        info!("Team '{}' deleted; {} team(s) rebuilt", key, affected.len());

        Ok(MutationReport {
            message: format!("Team '{}' deleted.", key),
            affected_teams: affected,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every team with its current status, sorted by key.
    pub async fn list_teams(&self) -> Vec<TeamSummary> {
        let state = self.state.read().await;
        let mut teams: Vec<TeamSummary> = state
            .teams
            .iter()
            .map(|(key, doc)| {
                let (status, reason) = match state.registry.team(key) {
                    Some(status) => (status.label(), status.reason().map(String::from)),
                    None => ("config_error", Some("not materialized".to_string())),
                };
                TeamSummary {
                    team_key: key.clone(),
                    team_name: doc.team_name.clone(),
                    status,
                    reason,
                }
            })
            .collect();
        teams.extend(state.malformed.iter().map(|(key, (name, reason))| TeamSummary {
            team_key: key.clone(),
            team_name: name.clone(),
            status: "config_error",
            reason: Some(reason.clone()),
        }));
        teams.sort_by(|a, b| a.team_key.cmp(&b.team_key));
        teams
    }

    pub async fn team_status(&self, key: &str) -> Option<TeamStatus> {
        self.state.read().await.registry.team(key).cloned()
    }

    /// Materialized team ready to run. The read lock is released on return.
    pub async fn active_team(&self, key: &str) -> Result<Arc<ResolvedTeam>> {
        let state = self.state.read().await;
        match state.registry.team(key) {
            Some(TeamStatus::Active(team)) => Ok(Arc::clone(team)),
            Some(TeamStatus::ConfigError(reason)) => Err(Error::NotActive {
                team: key.to_string(),
                reason: reason.clone(),
            }),
            None => Err(Error::not_found(EntityKind::Team, key)),
        }
    }

    /// Dependencies-first order of every team not on a stored cycle.
    pub async fn init_order(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    /// Stored document of any kind.
    pub async fn get(&self, kind: EntityKind, key: &str) -> Result<Document> {
        match kind {
            EntityKind::Agent | EntityKind::Team => {
                let _state = self.state.read().await;
                self.store.get(kind, key).await
            }
            EntityKind::Persona | EntityKind::Product => self.store.get(kind, key).await,
        }
    }

    /// Listing rows for personas, products or agents, sorted by key.
    pub async fn list_summaries(&self, kind: EntityKind) -> Result<Vec<EntitySummary>> {
        let docs = self.store.list(kind).await?;
        let summaries = docs
            .into_iter()
            .filter_map(|(key, doc)| summarize(kind, key, &doc))
            .collect();
        Ok(summaries)
    }

    // -----------------------------------------------------------------------
    // Personas & products
    // -----------------------------------------------------------------------

    pub async fn create_leaf(&self, kind: EntityKind, key: &str, data: Document) -> Result<MutationReport> {
        leaf_kind(kind)?;
        validate_key(kind, key)?;
        kind.schema().validate(&data)?;

        let _guard = self.leaf_lock.lock().await;
        if self.store.exists(kind, key).await? {
            return Err(Error::already_exists(kind, key));
        }
        self.store.put(kind, key, data).await?;
        info!("{} '{}' created", kind, key);
        Ok(MutationReport::new(format!("{} '{}' created.", capitalize(kind), key)))
    }

    pub async fn update_leaf(&self, kind: EntityKind, key: &str, patch: Document) -> Result<MutationReport> {
        leaf_kind(kind)?;
        let _guard = self.leaf_lock.lock().await;
        let current = self.store.get(kind, key).await?;
        let merged = kind.schema().merge(&current, &patch)?;
        self.store.put(kind, key, merged).await?;
        info!("{} '{}' updated", kind, key);
        Ok(MutationReport::new(format!("{} '{}' updated.", capitalize(kind), key)))
    }

    pub async fn delete_leaf(&self, kind: EntityKind, key: &str) -> Result<MutationReport> {
        leaf_kind(kind)?;
        let _guard = self.leaf_lock.lock().await;
        self.store.delete(kind, key).await?;
        info!("{} '{}' deleted", kind, key);
        Ok(MutationReport::new(format!("{} '{}' deleted.", capitalize(kind), key)))
    }
}

fn leaf_kind(kind: EntityKind) -> Result<()> {
    match kind {
        EntityKind::Persona | EntityKind::Product => Ok(()),
        _ => Err(Error::validation(format!("{} documents are managed through the team graph", kind))),
    }
}

fn capitalize(kind: EntityKind) -> String {
    let name = kind.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn summarize(kind: EntityKind, key: String, doc: &Document) -> Option<EntitySummary> {
    match kind {
        EntityKind::Persona => {
            let persona: PersonaDoc = parse_document(kind, doc)
                .map_err(|e| warn!("Skipping malformed persona '{}': {}", key, e))
                .ok()?;
            Some(EntitySummary::Persona {
                persona_key: key,
                name: persona.name,
                role: persona.role,
                goals: persona.goals,
                profile_summary: persona.background.unwrap_or_else(|| "N/A".into()),
            })
        }
        EntityKind::Product => {
            let product: ProductDoc = parse_document(kind, doc)
                .map_err(|e| warn!("Skipping malformed product '{}': {}", key, e))
                .ok()?;
            Some(EntitySummary::Product {
                product_key: key,
                product_name: product.product_name,
                description: product.description,
            })
        }
        EntityKind::Agent => {
            let agent: AgentDoc = parse_document(kind, doc)
                .map_err(|e| warn!("Skipping malformed agent '{}': {}", key, e))
                .ok()?;
            Some(EntitySummary::Agent {
                agent_key: key,
                name: agent.name,
                role: agent.role,
            })
        }
        EntityKind::Team => None,
    }
}
