//! LLM types for requests and streaming responses

use serde::{Deserialize, Serialize};

/// LLM request
#[derive(Clone, Debug, Serialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            messages: Vec::new(),
            max_tokens: Some(8192),
            temperature: None,
            system: None,
        }
    }
}

impl LlmRequest {
    /// Single-turn request: one user message under an optional system prompt.
    pub fn single_turn(
        model: impl Into<String>,
        system: Option<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![LlmMessage::user(prompt)],
            system,
            ..Self::default()
        }
    }
}

/// Message in LLM conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Streaming delta from LLM
#[derive(Clone, Debug)]
pub enum StreamDelta {
    Text(String),
    Done { stop_reason: Option<String>, usage: Option<Usage> },
    Error(String),
}

/// Token usage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
