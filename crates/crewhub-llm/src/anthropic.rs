//! Anthropic Claude API provider with SSE streaming

use crate::provider::{cancelled, check_status, LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta, Usage};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let body = AnthropicRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens.unwrap_or(8192),
            stream: true,
            system: request.system.clone(),
            temperature: request.temperature,
        };

        debug!("Anthropic request: model={}", body.model);

        let send = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send();
        let response = tokio::select! {
            response = send => response?,
            _ = cancelled(&cancel) => return Err(LlmError::Cancelled),
        };
        let response = check_status("anthropic", response).await?;

        Ok(Box::pin(parse_sse_stream(response.bytes_stream(), cancel)))
    }
}

pub(crate) fn parse_sse_stream<S, E>(
    bytes_stream: S,
    cancel: Option<CancellationToken>,
) -> impl Stream<Item = LlmResult<StreamDelta>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let events = bytes_stream.eventsource();
        tokio::pin!(events);
        let mut usage = Usage::default();
        let mut stop_reason: Option<String> = None;

        loop {
            let next = tokio::select! {
                event = events.next() => Some(event),
                _ = cancelled(&cancel) => None,
            };
            let Some(event) = next else {
                yield Err(LlmError::Cancelled);
                return;
            };
            let Some(event) = event else { break };
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    return;
                }
            };
            if event.data.is_empty() {
                continue;
            }

            match event.event.as_str() {
                "message_start" => {
                    if let Ok(data) = serde_json::from_str::<MessageStart>(&event.data) {
                        usage.input_tokens = data.message.usage.input_tokens;
                    }
                }
                "content_block_delta" => {
                    if let Ok(data) = serde_json::from_str::<ContentBlockDelta>(&event.data) {
                        if let DeltaType::TextDelta { text } = data.delta {
                            yield Ok(StreamDelta::Text(text));
                        }
                    }
                }
                "message_delta" => {
                    if let Ok(data) = serde_json::from_str::<MessageDelta>(&event.data) {
                        if let Some(reason) = data.delta.stop_reason {
                            debug!("Message complete: stop_reason={}", reason);
                            stop_reason = Some(reason);
                        }
                        if let Some(u) = data.usage {
                            usage.output_tokens = u.output_tokens;
                        }
                    }
                }
                "message_stop" => break,
                "error" => {
                    let message = serde_json::from_str::<ErrorEvent>(&event.data)
                        .map(|data| data.error.message)
                        .unwrap_or_else(|_| event.data.clone());
                    yield Err(LlmError::StreamError(message));
                    return;
                }
                _ => {}
            }
        }

        yield Ok(StreamDelta::Done { stop_reason, usage: Some(usage) });
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<OutputUsage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct OutputUsage {
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
