//! Execution Gateway - one provider call per team run

use crate::lifecycle::TeamManager;
use crate::prompt::{assemble_task, render_team, RunContext};
use crewhub_core::{
    parse_document, CrewhubConfig, EntityKind, Error, PersonaDoc, ProductDoc, Result, SessionKey,
    Turn,
};
use crewhub_llm::{LlmProvider, LlmRequest};
use crewhub_store::{load_knowledge_base, SessionRecord, SessionStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Arguments of `run_ai_team`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RunRequest {
    pub team_name: String,
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub persona_key: Option<String>,
    #[serde(default)]
    pub product_key: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    pub status: &'static str,
    pub team_name: String,
    pub result: String,
}

pub struct ExecutionGateway {
    manager: Arc<TeamManager>,
    sessions: Arc<dyn SessionStore>,
    provider: std::result::Result<Arc<dyn LlmProvider>, String>,
    knowledge_base: PathBuf,
    team_model: String,
    agent_model: String,
    max_tokens: u32,
}

impl ExecutionGateway {
    pub fn new(
        manager: Arc<TeamManager>,
        sessions: Arc<dyn SessionStore>,
        config: &CrewhubConfig,
    ) -> Self {
        Self {
            manager,
            sessions,
            provider: Err("no LLM provider configured".into()),
            knowledge_base: config.knowledge_base_path(),
            team_model: config.team_model(),
            agent_model: config.agent_model(),
            max_tokens: config.provider.max_tokens,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Ok(provider);
        self
    }

    /// Keep running without a provider; runs fail with `reason`.
    pub fn without_provider(mut self, reason: impl Into<String>) -> Self {
        self.provider = Err(reason.into());
        self
    }

    pub fn manager(&self) -> &Arc<TeamManager> {
        &self.manager
    }

    pub async fn start_session(&self, initial_context: Option<String>) -> Result<SessionRecord> {
        self.sessions.create(initial_context).await
    }

    /// Run a team against a prompt.
    ///
    /// Order of checks: the team must exist and be active, then a provider
    /// must be available. Missing persona, product or session degrade to
    /// "none" with a warning. The prompt and the result are appended to the
    /// session only after the provider succeeded.
    pub async fn run_team(&self, request: RunRequest) -> Result<RunOutcome> {
        let team = self.manager.active_team(&request.team_name).await?;
        let provider = self
            .provider
            .as_ref()
            .map_err(|reason| Error::Config(reason.clone()))?;

        let session = match request.session_id.as_deref().filter(|s| !s.is_empty()) {
            Some(id) => Some(SessionKey::parse(id)?),
            None => None,
        };
        let history = match &session {
            Some(key) => match self.sessions.read_all(key).await {
                Ok(turns) => Some(turns),
                Err(Error::NotFound { .. }) => {
                    warn!("Session '{}' not found; running without history", key);
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let persona: Option<PersonaDoc> = self.lookup(EntityKind::Persona, request.persona_key.as_deref()).await;
        let product: Option<ProductDoc> = self.lookup(EntityKind::Product, request.product_key.as_deref()).await;
        let knowledge_base = load_knowledge_base(&self.knowledge_base).await;

        let ctx = RunContext {
            history: history.as_deref().unwrap_or(&[]),
            knowledge_base: knowledge_base.as_deref(),
            product: product.as_ref(),
            persona: persona.as_ref(),
        };
        let task = assemble_task(&ctx, &request.prompt);
        let system = render_team(&team, &self.agent_model);

        let mut llm_request = LlmRequest::single_turn(&self.team_model, Some(system), task);
        llm_request.max_tokens = Some(self.max_tokens);
        debug!(
            "Running team '{}' on {} ({} history turns)",
            team.key,
            provider.name(),
            ctx.history.len()
        );

        let result = provider
            .generate(llm_request)
            .await
            .map_err(|e| Error::provider(provider.name(), e.to_string()))?;
        info!("Team '{}' completed ({} chars)", team.key, result.len());

        if let (Some(key), Some(_)) = (&session, &history) {
            for turn in [Turn::user(request.prompt.clone()), Turn::assistant(result.clone())] {
                if let Err(e) = self.sessions.append(key, turn).await {
                    warn!("Failed to record turn in session '{}': {}", key, e);
                }
            }
        }

        Ok(RunOutcome {
            status: "completed",
            team_name: request.team_name,
            result,
        })
    }

    /// Typed persona or product; anything missing or malformed resolves to `None`.
    async fn lookup<T: serde::de::DeserializeOwned>(&self, kind: EntityKind, key: Option<&str>) -> Option<T> {
        let key = key.filter(|k| !k.is_empty())?;
        match self.manager.get(kind, key).await {
            Ok(doc) => parse_document(kind, &doc)
                .map_err(|e| warn!("Ignoring {} '{}': {}", kind, key, e))
                .ok(),
            Err(e) => {
                warn!("Ignoring {} '{}': {}", kind, key, e);
                None
            }
        }
    }
}
