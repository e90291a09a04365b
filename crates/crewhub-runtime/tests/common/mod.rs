//! Shared fixtures: a scripted LLM provider and document builders

#![allow(dead_code)]

use crewhub_core::{CrewhubConfig, Document};
use crewhub_llm::{CancellationToken, LlmError, LlmProvider, LlmRequest, LlmResult, LlmStream, StreamDelta};
use crewhub_runtime::TeamManager;
use crewhub_store::{EntityStore, MemoryEntityStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What the mock answers on each call
#[derive(Clone, Debug)]
pub enum MockBehavior {
    Text(String),
    Error(String),
}

/// Each call pops the next behavior; the last one repeats.
pub struct MockProvider {
    behaviors: Mutex<Vec<MockBehavior>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockProvider {
    pub fn constant(behavior: MockBehavior) -> Self {
        Self::sequence(vec![behavior])
    }

    pub fn sequence(mut behaviors: Vec<MockBehavior>) -> Self {
        behaviors.reverse();
        Self {
            behaviors: Mutex::new(behaviors),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().await.last().cloned()
    }

    async fn next_behavior(&self) -> MockBehavior {
        let mut behaviors = self.behaviors.lock().await;
        if behaviors.len() > 1 {
            behaviors.pop().unwrap()
        } else {
            behaviors
                .last()
                .cloned()
                .unwrap_or(MockBehavior::Text("(mock: no behavior)".into()))
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        _cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        self.requests.lock().await.push(request);
        match self.next_behavior().await {
            MockBehavior::Text(text) => {
                let deltas: Vec<LlmResult<StreamDelta>> = vec![
                    Ok(StreamDelta::Text(text)),
                    Ok(StreamDelta::Done { stop_reason: Some("stop".into()), usage: None }),
                ];
                Ok(Box::pin(futures::stream::iter(deltas)))
            }
            MockBehavior::Error(message) => Err(LlmError::RequestFailed(message)),
        }
    }
}

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("document literal must be an object")
}

pub fn agent(name: &str) -> Document {
    doc(json!({ "name": name, "role": format!("{} role", name), "description": format!("{} does things", name) }))
}

pub fn team(name: &str, members: &[&str]) -> Document {
    doc(json!({ "team_name": name, "members": members }))
}

pub async fn manager() -> (Arc<TeamManager>, Arc<dyn EntityStore>) {
    let store: Arc<dyn EntityStore> = Arc::new(MemoryEntityStore::new());
    let manager = TeamManager::load(Arc::clone(&store)).await.unwrap();
    (Arc::new(manager), store)
}

pub fn config() -> CrewhubConfig {
    let mut config = CrewhubConfig::default();
    config.knowledge_base = Some("/nonexistent/knowledge_base.md".into());
    config
}
