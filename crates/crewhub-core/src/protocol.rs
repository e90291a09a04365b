//! Stdio protocol - JSON-RPC 2.0 carrying MCP tool calls
//!
//! Wire format (one JSON object per line):
//!
//! Client → Server (request):
//!   { "jsonrpc": "2.0", "id": 7, "method": "tools/call",
//!     "params": { "name": "create_team", "arguments": { "team_key": "core", "data": { ... } } } }
//!
//! Server → Client (response):
//!   { "jsonrpc": "2.0", "id": 7, "result": { "content": [{ "type": "text", "text": "..." }], "isError": false } }
//!   { "jsonrpc": "2.0", "id": 7, "error": { "code": -32601, "message": "Method not found: foo" } }
//!
//! Client → Server (notification, no id, never answered):
//!   { "jsonrpc": "2.0", "method": "notifications/initialized" }

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// RPC request or notification from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications. Numbers and strings are both echoed back verbatim.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// RPC response to the client.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response with a result value.
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    pub fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::err(Value::Null, PARSE_ERROR, message)
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::err(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(id: Value, message: impl Into<String>) -> Self {
        Self::err(id, INVALID_PARAMS, message)
    }

    pub fn internal_error(id: Value, message: impl Into<String>) -> Self {
        Self::err(id, INTERNAL_ERROR, message)
    }
}

/// RPC error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

// ---------------------------------------------------------------------------
// MCP payloads
// ---------------------------------------------------------------------------

/// Tool entry returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Content item inside a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Result of `tools/call`. Tool failures travel here with `isError`, not as RPC errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Pretty-printed JSON body.
    pub fn json(value: &Value) -> Self {
        Self {
            content: vec![ContentItem::Text {
                text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            }],
            is_error: false,
        }
    }

    /// Error body `{ "error": ..., "kind": ... }`, plus the cycle path for cycle rejections.
    pub fn from_error(err: &Error) -> Self {
        let mut body = serde_json::json!({
            "error": err.to_string(),
            "kind": err.kind(),
        });
        match err {
            Error::CycleDetected { cycle } => {
                body["cycle"] = serde_json::json!(cycle);
            }
            Error::Provider { provider, .. } => {
                body["provider"] = serde_json::json!(provider);
            }
            _ => {}
        }
        let mut result = Self::json(&body);
        result.is_error = true;
        result
    }

    /// Text of the first content item.
    pub fn text(&self) -> &str {
        match self.content.first() {
            Some(ContentItem::Text { text }) => text,
            None => "",
        }
    }
}
