//! crewhub configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists, then environment
//! variables override individual values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewhubConfig {
    /// Directory holding personas.json, products.json, agents.json, teams.json.
    pub data_dir: PathBuf,
    /// Directory holding session-<id>.json files.
    pub sessions_dir: PathBuf,
    /// Sessions older than this are removed when a new session starts.
    pub session_ttl_hours: u64,
    /// Company-wide knowledge base injected into every run. Defaults to `<data_dir>/knowledge_base.md`.
    pub knowledge_base: Option<PathBuf>,
    /// LLM provider selection.
    pub provider: ProviderConfig,
    /// Log output.
    pub log: LogConfig,
}

/// Which provider family serves `run_ai_team`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Deepseek,
    Openailike,
    Anthropic,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepseek" => Ok(Self::Deepseek),
            "openailike" => Ok(Self::Openailike),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(format!("unsupported provider: '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model used for the single team-level call. Falls back to the provider default.
    pub team_model: Option<String>,
    /// Default model reference for agents that do not name one.
    pub agent_model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append logs to this file in addition to stderr.
    pub file: Option<PathBuf>,
    /// EnvFilter directive used when RUST_LOG is unset.
    pub filter: String,
}

// ============================================================
// Defaults
// ============================================================

impl Default for CrewhubConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sessions_dir: PathBuf::from("mcp_sessions"),
            session_ttl_hours: 24,
            knowledge_base: None,
            provider: ProviderConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            team_model: None,
            agent_model: None,
            api_key: None,
            base_url: None,
            max_tokens: 8192,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            filter: "crewhub=info".into(),
        }
    }
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek-chat",
            Self::Openailike => "glm-4",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl CrewhubConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Override values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Override values from an arbitrary variable lookup.
    pub fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("CREWHUB_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("CREWHUB_SESSIONS_DIR") {
            self.sessions_dir = PathBuf::from(dir);
        }
        if let Some(kind) = var("LLM_PROVIDER") {
            match kind.parse() {
                Ok(kind) => self.provider.kind = kind,
                Err(e) => tracing::error!("LLM_PROVIDER ignored: {}", e),
            }
        }

        let p = &mut self.provider;
        match p.kind {
            ProviderKind::Deepseek => {
                p.api_key = var("DEEPSEEK_API_KEY").or(p.api_key.take());
            }
            ProviderKind::Openailike => {
                p.api_key = var("OpenAILike_API_KEY").or(p.api_key.take());
                p.base_url = var("OpenAILike_BASE_URL").or(p.base_url.take());
                p.team_model = var("OpenAILike_MODEL_ID").or(p.team_model.take());
                p.agent_model = var("OpenAILike_AGENT_MODEL_ID").or(p.agent_model.take());
            }
            ProviderKind::Anthropic => {
                p.api_key = var("ANTHROPIC_API_KEY").or(p.api_key.take());
                p.base_url = var("ANTHROPIC_API_URL").or(p.base_url.take());
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn knowledge_base_path(&self) -> PathBuf {
        self.knowledge_base
            .clone()
            .unwrap_or_else(|| self.data_dir.join("knowledge_base.md"))
    }

    pub fn team_model(&self) -> String {
        self.provider
            .team_model
            .clone()
            .unwrap_or_else(|| self.provider.kind.default_model().to_string())
    }

    pub fn agent_model(&self) -> String {
        self.provider
            .agent_model
            .clone()
            .unwrap_or_else(|| self.provider.kind.default_model().to_string())
    }
}
