//! Tests for the lifecycle manager: transactional team/agent mutations,
//! cycle rejection, selective rebuilds and startup recovery

mod common;

use common::*;
use crewhub_core::{Document, EntityKind, Error, Result};
use crewhub_runtime::{EntitySummary, TeamManager, TeamStatus};
use crewhub_store::{EntityStore, JsonFileEntityStore, MemoryEntityStore};
use serde_json::json;
use std::sync::Arc;

async fn status_of(manager: &TeamManager, key: &str) -> (String, Option<String>) {
    let teams = manager.list_teams().await;
    let row = teams
        .iter()
        .find(|t| t.team_key == key)
        .unwrap_or_else(|| panic!("team {} not listed", key));
    (row.status.to_string(), row.reason.clone())
}

// ===========================================================================
// Agents
// ===========================================================================

#[tokio::test]
async fn create_agent_rejects_duplicates_and_bad_documents() {
    let (manager, _) = manager().await;
    manager.create_agent("writer", agent("Writer")).await.unwrap();

    let err = manager.create_agent("writer", agent("Writer")).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));

    let err = manager
        .create_agent("editor", doc(json!({ "name": "E" })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}

#[tokio::test]
async fn deleting_sole_agent_degrades_only_its_team() {
    let (manager, _) = manager().await;
    manager.create_agent("x", agent("X")).await.unwrap();
    manager.create_agent("other", agent("Other")).await.unwrap();
    manager.create_team("y", team("Y", &["x"])).await.unwrap();
    manager.create_team("z", team("Z", &["other"])).await.unwrap();

    let report = manager.delete_agent("x").await.unwrap();
    assert_eq!(report.affected_teams.len(), 1);
    assert_eq!(report.affected_teams[0].team_key, "y");

    let (status, reason) = status_of(&manager, "y").await;
    assert_eq!(status, "config_error");
    assert_eq!(reason.as_deref(), Some("team 'y' references unknown member 'x'"));
    assert_eq!(status_of(&manager, "z").await.0, "active");

    manager.create_agent("x", agent("X")).await.unwrap();
    assert_eq!(status_of(&manager, "y").await.0, "active");
}

#[tokio::test]
async fn agent_update_reaches_transitive_parents() {
    let (manager, _) = manager().await;
    manager.create_agent("w", agent("W")).await.unwrap();
    manager.create_team("inner", team("Inner", &["w"])).await.unwrap();
    manager.create_team("outer", team("Outer", &["inner"])).await.unwrap();
    manager.create_team("unrelated", team("U", &[])).await.unwrap();

    let report = manager
        .update_agent("w", doc(json!({ "instructions": "be concise" })))
        .await
        .unwrap();
    let keys: Vec<&str> = report.affected_teams.iter().map(|t| t.team_key.as_str()).collect();
    assert_eq!(keys, vec!["inner", "outer"]);

    let outer = manager.active_team("outer").await.unwrap();
    match &outer.members[0] {
        crewhub_runtime::Member::Team(inner) => match &inner.members[0] {
            crewhub_runtime::Member::Agent(w) => {
                assert_eq!(w.doc.instructions.as_deref(), Some("be concise"))
            }
            other => panic!("expected agent, got {:?}", other.key()),
        },
        other => panic!("expected team, got {:?}", other.key()),
    }
}

#[tokio::test]
async fn update_agent_rejects_unknown_field() {
    let (manager, store) = manager().await;
    manager.create_agent("w", agent("W")).await.unwrap();
    let err = manager
        .update_agent("w", doc(json!({ "salary": "lots" })))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid field 'salary'"));
    assert_eq!(store.get(EntityKind::Agent, "w").await.unwrap(), agent("W"));
}

#[tokio::test]
async fn missing_agent_is_not_found() {
    let (manager, _) = manager().await;
    assert!(matches!(manager.delete_agent("ghost").await, Err(Error::NotFound { .. })));
    assert!(matches!(
        manager.update_agent("ghost", Document::new()).await,
        Err(Error::NotFound { .. })
    ));
}

// ===========================================================================
// Teams: cycles and rollback
// ===========================================================================

#[tokio::test]
async fn self_membership_is_rejected() {
    let (manager, store) = manager().await;
    let err = manager.create_team("a", team("A", &["a"])).await.unwrap_err();
    match err {
        Error::CycleDetected { cycle } => assert_eq!(cycle, vec!["a", "a"]),
        other => panic!("expected cycle, got {}", other),
    }
    assert!(store.list_keys(EntityKind::Team).await.unwrap().is_empty());
    assert!(manager.list_teams().await.is_empty());
}

#[tokio::test]
async fn closing_a_chain_into_a_cycle_is_rolled_back() {
    let (manager, _) = manager().await;
    manager.create_agent("w", agent("W")).await.unwrap();
    manager.create_team("c", team("C", &["w"])).await.unwrap();
    manager.create_team("b", team("B", &["c"])).await.unwrap();
    manager.create_team("a", team("A", &["b"])).await.unwrap();
    let before = manager.get(EntityKind::Team, "c").await.unwrap();

    let err = manager
        .update_team("c", doc(json!({ "members": ["w", "a"] })))
        .await
        .unwrap_err();
    match &err {
        Error::CycleDetected { cycle } => {
            assert_eq!(cycle, &vec!["a", "b", "c", "a"]);
        }
        other => panic!("expected cycle, got {}", other),
    }
    assert!(err.to_string().contains("a → b → c → a"));

    assert_eq!(manager.get(EntityKind::Team, "c").await.unwrap(), before);
    for key in ["a", "b", "c"] {
        assert_eq!(status_of(&manager, key).await.0, "active");
    }
}

#[tokio::test]
async fn creating_a_referenced_team_can_close_a_cycle() {
    let (manager, _) = manager().await;
    manager.create_team("p", team("P", &["q"])).await.unwrap();
    assert_eq!(status_of(&manager, "p").await.0, "config_error");

    let err = manager.create_team("q", team("Q", &["p"])).await.unwrap_err();
    assert!(matches!(err, Error::CycleDetected { ref cycle } if cycle == &vec!["p", "q", "p"]));
    assert!(manager.get(EntityKind::Team, "q").await.is_err());
}

#[tokio::test]
async fn creating_a_referenced_team_activates_its_parent() {
    let (manager, _) = manager().await;
    manager.create_team("parent", team("Parent", &["child"])).await.unwrap();
    let (status, reason) = status_of(&manager, "parent").await;
    assert_eq!(status, "config_error");
    assert!(reason.unwrap().contains("'child'"));

    let report = manager.create_team("child", team("Child", &[])).await.unwrap();
    let keys: Vec<&str> = report.affected_teams.iter().map(|t| t.team_key.as_str()).collect();
    assert_eq!(keys, vec!["child", "parent"]);
    assert_eq!(status_of(&manager, "parent").await.0, "active");
}

#[tokio::test]
async fn duplicate_team_key_already_exists() {
    let (manager, _) = manager().await;
    manager.create_team("t", team("T", &[])).await.unwrap();
    let err = manager.create_team("t", team("T2", &[])).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));
    assert_eq!(manager.get(EntityKind::Team, "t").await.unwrap()["team_name"], "T");
}

#[tokio::test]
async fn update_with_current_configuration_is_a_no_op() {
    let (manager, store) = manager().await;
    manager.create_agent("w", agent("W")).await.unwrap();
    manager.create_team("t", team("T", &["w", "w"])).await.unwrap();
    let current = store.get(EntityKind::Team, "t").await.unwrap();
    let teams_before = manager.list_teams().await;

    let report = manager.update_team("t", current.clone()).await.unwrap();
    assert!(report.affected_teams.is_empty());
    assert_eq!(store.get(EntityKind::Team, "t").await.unwrap(), current);
    assert_eq!(manager.list_teams().await, teams_before);
}

#[tokio::test]
async fn broken_member_team_propagates_to_parents() {
    let (manager, _) = manager().await;
    manager.create_agent("w", agent("W")).await.unwrap();
    manager.create_team("leaf", team("Leaf", &["w"])).await.unwrap();
    manager.create_team("mid", team("Mid", &["leaf"])).await.unwrap();
    manager.create_team("top", team("Top", &["mid", "w"])).await.unwrap();

    manager
        .update_team("leaf", doc(json!({ "members": ["w", "nobody"] })))
        .await
        .unwrap();
    assert_eq!(status_of(&manager, "leaf").await.0, "config_error");
    let (status, reason) = status_of(&manager, "mid").await;
    assert_eq!(status, "config_error");
    assert_eq!(reason.as_deref(), Some("member team 'leaf' is in config_error"));
    assert_eq!(status_of(&manager, "top").await.0, "config_error");

    manager
        .update_team("leaf", doc(json!({ "members": ["w"] })))
        .await
        .unwrap();
    for key in ["leaf", "mid", "top"] {
        assert_eq!(status_of(&manager, key).await.0, "active", "{}", key);
    }
}

#[tokio::test]
async fn deleting_a_member_team_degrades_parent() {
    let (manager, _) = manager().await;
    manager.create_team("child", team("Child", &[])).await.unwrap();
    manager.create_team("parent", team("Parent", &["child"])).await.unwrap();

    manager.delete_team("child").await.unwrap();
    assert_eq!(status_of(&manager, "parent").await.0, "config_error");
    assert!(matches!(manager.delete_team("child").await, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn team_and_agent_with_same_key_resolve_to_team() {
    let (manager, _) = manager().await;
    manager.create_agent("dual", agent("Dual")).await.unwrap();
    manager.create_team("dual", team("Dual team", &[])).await.unwrap();
    manager.create_team("host", team("Host", &["dual"])).await.unwrap();

    let host = manager.active_team("host").await.unwrap();
    assert!(matches!(host.members[0], crewhub_runtime::Member::Team(_)));

    // Without the team the key falls back to the agent.
    manager.delete_team("dual").await.unwrap();
    let host = manager.active_team("host").await.unwrap();
    assert!(matches!(host.members[0], crewhub_runtime::Member::Agent(_)));
}

#[tokio::test]
async fn init_order_is_dependencies_first() {
    let (manager, _) = manager().await;
    manager.create_team("d", team("D", &[])).await.unwrap();
    manager.create_team("b", team("B", &["d"])).await.unwrap();
    manager.create_team("c", team("C", &["d"])).await.unwrap();
    manager.create_team("a", team("A", &["b", "c"])).await.unwrap();

    let order = manager.init_order().await;
    let pos = |k: &str| order.iter().position(|o| o == k).unwrap();
    assert!(pos("d") < pos("b") && pos("d") < pos("c"));
    assert!(pos("b") < pos("a") && pos("c") < pos("a"));
}

#[tokio::test]
async fn empty_team_is_active() {
    let (manager, _) = manager().await;
    manager.create_team("solo", team("Solo", &[])).await.unwrap();
    assert!(matches!(
        manager.team_status("solo").await,
        Some(TeamStatus::Active(_))
    ));
}

// ===========================================================================
// Store failures
// ===========================================================================

/// Store whose writes always fail.
struct ReadOnlyStore(MemoryEntityStore);

#[async_trait::async_trait]
impl EntityStore for ReadOnlyStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Document> {
        self.0.get(kind, key).await
    }
    async fn put(&self, _kind: EntityKind, _key: &str, _doc: Document) -> Result<()> {
        Err(Error::Storage("disk full".into()))
    }
    async fn delete(&self, _kind: EntityKind, _key: &str) -> Result<()> {
        Err(Error::Storage("disk full".into()))
    }
    async fn list_keys(&self, kind: EntityKind) -> Result<Vec<String>> {
        self.0.list_keys(kind).await
    }
    async fn list(&self, kind: EntityKind) -> Result<Vec<(String, Document)>> {
        self.0.list(kind).await
    }
}

#[tokio::test]
async fn failed_store_write_leaves_registry_untouched() {
    let inner = MemoryEntityStore::new();
    inner.put(EntityKind::Team, "t", team("T", &[])).await.unwrap();
    let manager = TeamManager::load(Arc::new(ReadOnlyStore(inner))).await.unwrap();

    let err = manager.create_team("u", team("U", &["t"])).await.unwrap_err();
    assert_eq!(err.kind(), "storage_error");
    let err = manager.delete_team("t").await.unwrap_err();
    assert_eq!(err.kind(), "storage_error");

    let teams = manager.list_teams().await;
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].status, "active");
}

// ===========================================================================
// Startup recovery
// ===========================================================================

#[tokio::test]
async fn stored_cycle_is_quarantined_at_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("teams.json"),
        json!({
            "a": { "team_name": "A", "members": ["b"] },
            "b": { "team_name": "B", "members": ["a"] },
            "host": { "team_name": "Host", "members": ["a"] },
            "fine": { "team_name": "Fine", "members": [] }
        })
        .to_string(),
    )
    .unwrap();

    let store = Arc::new(JsonFileEntityStore::open(dir.path()).await.unwrap());
    let manager = TeamManager::load(store).await.unwrap();

    let (status, reason) = status_of(&manager, "a").await;
    assert_eq!(status, "config_error");
    assert_eq!(reason.as_deref(), Some("dependency cycle: a → b → a"));
    assert_eq!(status_of(&manager, "b").await.0, "config_error");
    assert_eq!(status_of(&manager, "host").await.0, "config_error");
    assert_eq!(status_of(&manager, "fine").await.0, "active");

    // Unrelated edits still go through, and breaking the cycle heals everything.
    manager.create_team("extra", team("Extra", &["fine"])).await.unwrap();
    manager
        .update_team("b", doc(json!({ "members": [] })))
        .await
        .unwrap();
    for key in ["a", "b", "host", "fine", "extra"] {
        assert_eq!(status_of(&manager, key).await.0, "active", "{}", key);
    }
}

async fn load_with_malformed_team() -> (tempfile::TempDir, Arc<JsonFileEntityStore>, TeamManager) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("teams.json"),
        json!({
            "bad": { "team_name": "Bad", "members": "oops" },
            "parent": { "team_name": "Parent", "members": ["bad"] }
        })
        .to_string(),
    )
    .unwrap();
    let store = Arc::new(JsonFileEntityStore::open(dir.path()).await.unwrap());
    let manager = TeamManager::load(store.clone()).await.unwrap();
    (dir, store, manager)
}

#[tokio::test]
async fn malformed_stored_team_is_listed_and_holds_its_key() {
    let (_dir, _store, manager) = load_with_malformed_team().await;

    let teams = manager.list_teams().await;
    let keys: Vec<_> = teams.iter().map(|t| t.team_key.as_str()).collect();
    assert_eq!(keys, vec!["bad", "parent"]);
    assert_eq!(teams[0].team_name, "Bad");
    assert_eq!(teams[0].status, "config_error");
    assert!(teams[0].reason.as_deref().unwrap().starts_with("malformed team document"));
    assert_eq!(
        status_of(&manager, "parent").await.1.as_deref(),
        Some("member team 'bad' is in config_error")
    );
    assert!(matches!(
        manager.active_team("bad").await,
        Err(Error::NotActive { .. })
    ));

    assert!(matches!(
        manager.create_team("bad", team("Again", &[])).await,
        Err(Error::AlreadyExists { .. })
    ));
    assert_eq!(manager.get(EntityKind::Team, "bad").await.unwrap()["members"], "oops");
}

#[tokio::test]
async fn malformed_stored_team_can_be_deleted() {
    let (_dir, store, manager) = load_with_malformed_team().await;

    let report = manager.delete_team("bad").await.unwrap();
    assert_eq!(report.message, "Team 'bad' deleted.");
    assert!(!store.exists(EntityKind::Team, "bad").await.unwrap());
    assert_eq!(
        status_of(&manager, "parent").await.1.as_deref(),
        Some("team 'parent' references unknown member 'bad'")
    );

    manager.create_team("bad", team("Bad", &[])).await.unwrap();
    assert_eq!(status_of(&manager, "bad").await.0, "active");
    assert_eq!(status_of(&manager, "parent").await.0, "active");
}

#[tokio::test]
async fn malformed_stored_team_is_repaired_by_update() {
    let (_dir, _store, manager) = load_with_malformed_team().await;

    manager
        .update_team("bad", doc(json!({ "members": [] })))
        .await
        .unwrap();
    let teams = manager.list_teams().await;
    assert_eq!(teams.len(), 2);
    assert!(teams.iter().all(|t| t.status == "active"));
}

// ===========================================================================
// Personas, products and listings
// ===========================================================================

#[tokio::test]
async fn persona_crud_and_summary() {
    let (manager, _) = manager().await;
    let persona = doc(json!({ "name": "Ann", "role": "CTO", "goals": ["scale"] }));
    manager.create_leaf(EntityKind::Persona, "ann", persona.clone()).await.unwrap();
    assert!(matches!(
        manager.create_leaf(EntityKind::Persona, "ann", persona).await,
        Err(Error::AlreadyExists { .. })
    ));

    manager
        .update_leaf(EntityKind::Persona, "ann", doc(json!({ "background": "ex-founder" })))
        .await
        .unwrap();
    let rows = manager.list_summaries(EntityKind::Persona).await.unwrap();
    match &rows[0] {
        EntitySummary::Persona { persona_key, profile_summary, .. } => {
            assert_eq!(persona_key, "ann");
            assert_eq!(profile_summary, "ex-founder");
        }
        other => panic!("unexpected row {:?}", other),
    }

    manager.delete_leaf(EntityKind::Persona, "ann").await.unwrap();
    assert!(manager.list_summaries(EntityKind::Persona).await.unwrap().is_empty());
}

#[tokio::test]
async fn leaf_operations_refuse_graph_kinds() {
    let (manager, _) = manager().await;
    let err = manager
        .create_leaf(EntityKind::Team, "t", team("T", &[]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}

#[tokio::test]
async fn product_requires_all_fields() {
    let (manager, _) = manager().await;
    let err = manager
        .create_leaf(EntityKind::Product, "p", doc(json!({ "product_name": "P" })))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("description"));
}

#[tokio::test]
async fn agent_summaries_are_sorted() {
    let (manager, _) = manager().await;
    manager.create_agent("zed", agent("Zed")).await.unwrap();
    manager.create_agent("amy", agent("Amy")).await.unwrap();
    let rows = serde_json::to_value(manager.list_summaries(EntityKind::Agent).await.unwrap()).unwrap();
    assert_eq!(rows[0]["agent_key"], "amy");
    assert_eq!(rows[1]["name"], "Zed");
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test]
async fn concurrent_mutations_serialize() {
    let (manager, _) = manager().await;
    let mut handles = Vec::new();
    for i in 0..16 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let key = format!("agent{}", i);
            manager.create_agent(&key, agent(&key)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let members: Vec<String> = (0..16).map(|i| format!("agent{}", i)).collect();
    let members: Vec<&str> = members.iter().map(String::as_str).collect();
    manager.create_team("all", team("All", &members)).await.unwrap();
    assert_eq!(manager.active_team("all").await.unwrap().members.len(), 16);
}
