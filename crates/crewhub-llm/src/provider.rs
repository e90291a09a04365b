//! LLM Provider trait

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiCompatProvider;
use crate::types::{LlmRequest, StreamDelta};
use crewhub_core::{CrewhubConfig, ProviderKind};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// LLM Provider trait
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Stream a completion response. If `cancel` is provided and triggered,
    /// the underlying HTTP connection is dropped and the stream yields `LlmError::Cancelled`.
    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream>;

    /// Run a request to completion and return the concatenated text.
    async fn generate(&self, request: LlmRequest) -> LlmResult<String> {
        let mut stream = self.complete_stream(request, None).await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::Text(chunk) => text.push_str(&chunk),
                StreamDelta::Done { .. } => break,
                StreamDelta::Error(message) => return Err(LlmError::StreamError(message)),
            }
        }
        Ok(text)
    }
}

/// Build the provider selected by `config.provider.kind`.
pub fn from_config(config: &CrewhubConfig) -> LlmResult<Arc<dyn LlmProvider>> {
    let p = &config.provider;
    let provider: Arc<dyn LlmProvider> = match p.kind {
        ProviderKind::Deepseek => {
            let key = p
                .api_key
                .clone()
                .ok_or_else(|| LlmError::NotConfigured("DEEPSEEK_API_KEY is not set".into()))?;
            let mut provider = OpenAiCompatProvider::deepseek(key);
            if let Some(url) = &p.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::Openailike => match (&p.api_key, &p.base_url) {
            (Some(key), Some(url)) => {
                Arc::new(OpenAiCompatProvider::openai_like(key.clone(), url.clone()))
            }
            _ => {
                return Err(LlmError::NotConfigured(
                    "OpenAILike_API_KEY and OpenAILike_BASE_URL must both be set".into(),
                ))
            }
        },
        ProviderKind::Anthropic => {
            let key = p
                .api_key
                .clone()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY is not set".into()))?;
            let mut provider = AnthropicProvider::new(key);
            if let Some(url) = &p.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Arc::new(provider)
        }
    };
    Ok(provider)
}

/// Map a non-success HTTP status onto an `LlmError`.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> LlmResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    tracing::error!("{} error {}: {}", provider, status, error_text);
    match status.as_u16() {
        401 | 403 => Err(LlmError::AuthFailed(error_text)),
        429 => Err(LlmError::RateLimited { retry_after_ms: 60000 }),
        _ => Err(LlmError::RequestFailed(format!("{}: {}", status, error_text))),
    }
}

/// Resolves when `cancel` fires; never resolves without a token.
pub(crate) async fn cancelled(cancel: &Option<CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => futures::future::pending().await,
    }
}
