//! Error types for crewhub

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: String, key: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("dependency cycle detected: {}", format_cycle(.cycle))]
    CycleDetected { cycle: Vec<String> },

    #[error("team '{team}' references unknown member '{member}'")]
    UnresolvedReference { team: String, member: String },

    #[error("provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("team '{team}' is not active: {reason}")]
    NotActive { team: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(kind: impl ToString, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            key: key.into(),
        }
    }

    pub fn already_exists(kind: impl ToString, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            key: key.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable tag, reported to tool clients next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Validation(_) => "validation_error",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::Provider { .. } => "provider_error",
            Self::NotActive { .. } => "not_active",
            Self::Storage(_) | Self::Io(_) | Self::Json(_) => "storage_error",
            Self::Config(_) => "config_error",
        }
    }
}

/// Render a cycle path as `a → b → a`.
pub fn format_cycle(cycle: &[String]) -> String {
    cycle.join(" → ")
}
