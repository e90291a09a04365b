//! OpenAI-compatible chat completions provider (DeepSeek and OpenAI-like endpoints)

use crate::provider::{cancelled, check_status, LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta, Usage};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

pub struct OpenAiCompatProvider {
    name: String,
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self::new("deepseek", api_key, DEEPSEEK_BASE_URL)
    }

    pub fn openai_like(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::new("openailike", api_key, base_url)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let body = ChatRequest::from(&request);
        debug!("{} request: model={} messages={}", self.name, body.model, body.messages.len());

        let send = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();
        let response = tokio::select! {
            response = send => response?,
            _ = cancelled(&cancel) => return Err(LlmError::Cancelled),
        };
        let response = check_status(&self.name, response).await?;

        Ok(Box::pin(parse_chat_stream(response.bytes_stream(), cancel)))
    }
}

/// Turn an OpenAI-style SSE body into stream deltas.
pub(crate) fn parse_chat_stream<S, E>(
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
        let mut usage: Option<Usage> = None;
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

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                break;
            }

            let chunk: ChatChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::InvalidResponse(format!("{}: {}", e, data)));
                    return;
                }
            };
            if let Some(error) = chunk.error {
                yield Err(LlmError::StreamError(error.message));
                return;
            }
            if let Some(u) = chunk.usage {
                usage = Some(Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                });
            }
            for choice in chunk.choices {
                if let Some(text) = choice.delta.content {
                    if !text.is_empty() {
                        yield Ok(StreamDelta::Text(text));
                    }
                }
                if choice.finish_reason.is_some() {
                    stop_reason = choice.finish_reason;
                }
            }
        }

        yield Ok(StreamDelta::Done { stop_reason, usage });
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl From<&LlmRequest> for ChatRequest {
    fn from(request: &LlmRequest) -> Self {
        let system = request.system.iter().map(|s| ChatMessage {
            role: "system".into(),
            content: s.clone(),
        });
        let rest = request.messages.iter().map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        });
        Self {
            model: request.model.clone(),
            messages: system.chain(rest).collect(),
            stream: true,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChunkError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn body(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        let chunks: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures::stream::iter(chunks)
    }

    async fn collect(parts: &[&str]) -> Vec<LlmResult<StreamDelta>> {
        parse_chat_stream(body(parts), None).collect().await
    }

    #[tokio::test]
    async fn text_deltas_then_done() {
        let deltas = collect(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}],",
            "\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2}}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        let texts: Vec<String> = deltas
            .iter()
            .filter_map(|d| match d {
                Ok(StreamDelta::Text(t)) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hel", "lo"]);

        match deltas.last() {
            Some(Ok(StreamDelta::Done { stop_reason, usage })) => {
                assert_eq!(stop_reason.as_deref(), Some("stop"));
                assert_eq!(usage.as_ref().map(|u| u.output_tokens), Some(2));
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_chunk_ends_stream() {
        let deltas = collect(&["data: {\"error\":{\"message\":\"overloaded\"}}\n\n"]).await;
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Err(LlmError::StreamError(m)) if m == "overloaded"));
    }

    #[tokio::test]
    async fn garbage_is_invalid_response() {
        let deltas = collect(&["data: not json\n\n"]).await;
        assert!(matches!(&deltas[0], Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn cancelled_token_stops_stream() {
        let token = CancellationToken::new();
        token.cancel();
        let deltas: Vec<_> = parse_chat_stream(futures::stream::pending::<Result<Bytes, std::io::Error>>(), Some(token))
            .collect()
            .await;
        assert_eq!(deltas.len(), 1);
        assert!(matches!(deltas[0], Err(LlmError::Cancelled)));
    }

    #[test]
    fn system_prompt_becomes_first_message() {
        let request = LlmRequest::single_turn("m", Some("sys".into()), "hi");
        let body = serde_json::to_value(ChatRequest::from(&request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn endpoint_joins_base_url() {
        let p = OpenAiCompatProvider::openai_like("k", "https://llm.local/v1/");
        assert_eq!(p.endpoint(), "https://llm.local/v1/chat/completions");
        assert_eq!(
            OpenAiCompatProvider::deepseek("k").endpoint(),
            "https://api.deepseek.com/chat/completions"
        );
    }
}
