//! RPC router - dispatches JSON-RPC methods and MCP tool calls
//!
//! Protocol methods (`initialize`, `ping`, `tools/list`, `tools/call`) are
//! routed here. Tool calls are dispatched by name onto the `TeamManager`
//! and the `ExecutionGateway`; tool failures come back as tool results with
//! `isError` set, never as RPC errors.

use crate::tools;
use crewhub_core::{
    Document, EntityKind, Error, RpcRequest, RpcResponse, ToolCallParams, ToolCallResult,
    INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, MCP_PROTOCOL_VERSION, METHOD_NOT_FOUND,
};
use crewhub_runtime::{ExecutionGateway, MutationReport, RunRequest, TeamManager};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state handed to every request.
pub struct AppContext {
    pub manager: Arc<TeamManager>,
    pub runner: ExecutionGateway,
}

impl AppContext {
    pub fn new(runner: ExecutionGateway) -> Self {
        Self {
            manager: Arc::clone(runner.manager()),
            runner,
        }
    }
}

/// Result type for RPC handlers.
pub type RpcResult = Result<Value, (i32, String)>;

/// Handle one line of input. Returns `None` for notifications and blank lines.
pub async fn handle_line(line: &str, ctx: &AppContext) -> Option<RpcResponse> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Some(RpcResponse::parse_error(format!("Parse error: {}", e))),
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return Some(RpcResponse::err(id, INVALID_REQUEST, format!("Invalid request: {}", e)))
        }
    };
    if let Some(version) = request.jsonrpc.as_deref() {
        if version != JSONRPC_VERSION {
            return Some(RpcResponse::err(
                id,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", version),
            ));
        }
    }

    match request.id {
        None => {
            debug!("notification: {}", request.method);
            None
        }
        Some(id) => Some(to_response(id, route_rpc(&request.method, request.params, ctx).await)),
    }
}

/// Route an RPC method call to the appropriate handler.
pub async fn route_rpc(method: &str, params: Value, ctx: &AppContext) -> RpcResult {
    match method {
        "initialize" => handle_initialize(params),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tools::catalogue() })),
        "tools/call" => handle_tools_call(params, ctx).await,
        _ => Err((METHOD_NOT_FOUND, format!("Method not found: {}", method))),
    }
}

/// Convert an RPC result to an RpcResponse.
pub fn to_response(id: Value, result: RpcResult) -> RpcResponse {
    match result {
        Ok(value) => RpcResponse::ok(id, value),
        Err((code, message)) => RpcResponse::err(id, code, message),
    }
}

// ---------------------------------------------------------------------------
// initialize
// ---------------------------------------------------------------------------

fn handle_initialize(params: Value) -> RpcResult {
    if let Some(client) = params.get("clientInfo").and_then(|c| c.get("name")).and_then(Value::as_str) {
        info!("Client connected: {}", client);
    }
    Ok(json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "crewhub",
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

// ---------------------------------------------------------------------------
// tools/call
// ---------------------------------------------------------------------------

async fn handle_tools_call(params: Value, ctx: &AppContext) -> RpcResult {
    let call: ToolCallParams = serde_json::from_value(params)
        .map_err(|e| (INVALID_PARAMS, format!("Invalid tools/call params: {}", e)))?;
    if !tools::is_known(&call.name) {
        return Err((INVALID_PARAMS, format!("Unknown tool: {}", call.name)));
    }

    debug!("tools/call: {}", call.name);
    let result = match dispatch_tool(&call.name, &call.arguments, ctx).await {
        Ok(value) => ToolCallResult::json(&value),
        Err(e) => {
            warn!("Tool '{}' failed: {}", call.name, e);
            ToolCallResult::from_error(&e)
        }
    };
    serde_json::to_value(result).map_err(|e| (crewhub_core::INTERNAL_ERROR, e.to_string()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Crud {
    Create,
    List,
    Get,
    Update,
    Delete,
}

/// Map a CRUD tool name onto its operation and entity kind.
fn parse_crud(name: &str) -> Option<(Crud, EntityKind)> {
    EntityKind::ALL.into_iter().find_map(|kind| {
        let op = if name == format!("create_{}", kind) {
            Crud::Create
        } else if name == format!("list_{}", kind.plural()) {
            Crud::List
        } else if name == tools::get_tool(kind) {
            Crud::Get
        } else if name == format!("update_{}", kind) {
            Crud::Update
        } else if name == format!("delete_{}", kind) {
            Crud::Delete
        } else {
            return None;
        };
        Some((op, kind))
    })
}

/// Execute a tool by name.
pub async fn dispatch_tool(name: &str, args: &Value, ctx: &AppContext) -> crewhub_core::Result<Value> {
    match name {
        "start_session" => {
            let initial = args
                .get("initial_context")
                .and_then(Value::as_str)
                .map(String::from);
            let session = ctx.runner.start_session(initial).await?;
            Ok(json!({
                "message": "Session started successfully.",
                "session_id": session.session_id.to_string(),
            }))
        }
        "run_ai_team" => {
            let request: RunRequest = serde_json::from_value(args.clone())
                .map_err(|e| Error::validation(format!("invalid run_ai_team arguments: {}", e)))?;
            let outcome = ctx.runner.run_team(request).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        _ => {
            let (op, kind) =
                parse_crud(name).ok_or_else(|| Error::validation(format!("unknown tool: {}", name)))?;
            dispatch_crud(op, kind, args, &ctx.manager).await
        }
    }
}

async fn dispatch_crud(op: Crud, kind: EntityKind, args: &Value, manager: &TeamManager) -> crewhub_core::Result<Value> {
    let report = match op {
        Crud::List => return list_rows(kind, manager).await,
        Crud::Get => {
            let key = key_arg(kind, args)?;
            return Ok(Value::Object(manager.get(kind, key).await?));
        }
        Crud::Create => {
            let (key, data) = (key_arg(kind, args)?, data_arg(args)?);
            match kind {
                EntityKind::Agent => manager.create_agent(key, data).await?,
                EntityKind::Team => manager.create_team(key, data).await?,
                _ => manager.create_leaf(kind, key, data).await?,
            }
        }
        Crud::Update => {
            let (key, data) = (key_arg(kind, args)?, data_arg(args)?);
            match kind {
                EntityKind::Agent => manager.update_agent(key, data).await?,
                EntityKind::Team => manager.update_team(key, data).await?,
                _ => manager.update_leaf(kind, key, data).await?,
            }
        }
        Crud::Delete => {
            let key = key_arg(kind, args)?;
            match kind {
                EntityKind::Agent => manager.delete_agent(key).await?,
                EntityKind::Team => manager.delete_team(key).await?,
                _ => manager.delete_leaf(kind, key).await?,
            }
        }
    };
    success(report)
}

/// Summary rows, or a `message` object when the collection is empty.
async fn list_rows(kind: EntityKind, manager: &TeamManager) -> crewhub_core::Result<Value> {
    let rows = match kind {
        EntityKind::Team => serde_json::to_value(manager.list_teams().await)?,
        _ => serde_json::to_value(manager.list_summaries(kind).await?)?,
    };
    if rows.as_array().map(Vec::is_empty).unwrap_or(false) {
        return Ok(json!({ "message": format!("No {} found.", kind.plural()) }));
    }
    Ok(rows)
}

fn key_arg(kind: EntityKind, args: &Value) -> crewhub_core::Result<&str> {
    let name = format!("{}_key", kind);
    args.get(&name)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation(format!("missing required argument: {}", name)))
}

fn data_arg(args: &Value) -> crewhub_core::Result<Document> {
    match args.get("data") {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(Error::validation("argument 'data' must be an object")),
        None => Err(Error::validation("missing required argument: data")),
    }
}

fn success(report: MutationReport) -> crewhub_core::Result<Value> {
    let mut body = json!({ "status": "success", "message": report.message });
    if !report.affected_teams.is_empty() {
        body["affected_teams"] = serde_json::to_value(&report.affected_teams)?;
    }
    Ok(body)
}
