//! JSON-RPC 2.0 envelope and MCP method routing.
//!
//! Transport-agnostic: `handle_line` takes one request line and returns the
//! response line, or `None` for notifications.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::context::AppContext;
use crate::dispatch::call_tool;
use crate::prompts::{prompt_definitions, render_prompt};
use crate::resources::{ResourceError, read_resource, resource_definitions};
use crate::tools::tool_definitions;

pub const PROTOCOL_VERSION: &str = "2025-06-18";
pub const SERVER_NAME: &str = "chanmux";

// ─── Envelope ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ─── Entry points ────────────────────────────────────────────────

/// Handle one newline-delimited request. Blank lines and notifications
/// produce no output.
pub async fn handle_line(ctx: &AppContext, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let response = match serde_json::from_str::<Value>(line) {
        Ok(request) => handle_message(ctx, request).await?,
        Err(e) => JsonRpcResponse::error(
            Value::Null,
            JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string()),
        ),
    };
    match serde_json::to_string(&response) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            None
        }
    }
}

pub async fn handle_message(ctx: &AppContext, request: Value) -> Option<JsonRpcResponse> {
    let Value::Object(request) = request else {
        return Some(JsonRpcResponse::error(
            Value::Null,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "request must be a JSON object"),
        ));
    };
    let id = request.get("id").cloned();
    let is_notification = id.is_none();
    let id = id.unwrap_or(Value::Null);

    if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Some(JsonRpcResponse::error(
            id,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "invalid JSON-RPC version")
                .with_data(json!({"expected": "2.0", "got": request.get("jsonrpc")})),
        ));
    }
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return Some(JsonRpcResponse::error(
            id,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "missing method"),
        ));
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    if is_notification {
        tracing::debug!(method, "notification");
        return None;
    }

    let result = route(ctx, method, &params).await;
    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(error) => JsonRpcResponse::error(id, error),
    })
}

async fn route(ctx: &AppContext, method: &str, params: &Value) -> Result<Value, JsonRpcError> {
    match method {
        "initialize" => Ok(initialize(params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_definitions() })),
        "tools/call" => tools_call(ctx, params).await,
        "resources/list" => Ok(json!({ "resources": resource_definitions() })),
        "resources/read" => resources_read(ctx, params).await,
        "prompts/list" => Ok(json!({ "prompts": prompt_definitions() })),
        "prompts/get" => prompts_get(ctx, params),
        _ => Err(JsonRpcError::new(
            JsonRpcError::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )),
    }
}

// ─── Methods ─────────────────────────────────────────────────────

fn initialize(params: &Value) -> Value {
    let version = params["protocolVersion"]
        .as_str()
        .unwrap_or(PROTOCOL_VERSION);
    if let Some(client) = params["clientInfo"]["name"].as_str() {
        tracing::info!(client, protocol = version, "client initialized");
    }
    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false },
            "prompts": { "listChanged": false },
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, JsonRpcError> {
    params[key].as_str().ok_or_else(|| {
        JsonRpcError::new(
            JsonRpcError::INVALID_PARAMS,
            format!("missing '{key}' parameter"),
        )
    })
}

fn text_content(value: &Value) -> Value {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    json!([{ "type": "text", "text": text }])
}

/// Tool failures are results with `isError`, not protocol errors, so the
/// calling agent sees them.
async fn tools_call(ctx: &AppContext, params: &Value) -> Result<Value, JsonRpcError> {
    let name = required_str(params, "name")?;
    let arguments = params.get("arguments").unwrap_or(&Value::Null);
    match call_tool(ctx, name, arguments).await {
        Ok(value) => Ok(json!({
            "content": text_content(&value),
            "structuredContent": value,
            "isError": false,
        })),
        Err(e) => {
            let error = json!({ "error": e });
            Ok(json!({
                "content": text_content(&error),
                "structuredContent": error,
                "isError": true,
            }))
        }
    }
}

async fn resources_read(ctx: &AppContext, params: &Value) -> Result<Value, JsonRpcError> {
    let uri = required_str(params, "uri")?;
    match read_resource(ctx, uri).await {
        Ok(value) => Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            }],
        })),
        Err(e @ ResourceError::Unknown(_)) => Err(JsonRpcError::new(
            JsonRpcError::INVALID_PARAMS,
            e.to_string(),
        )
        .with_data(json!({ "uri": uri }))),
        Err(ResourceError::Tmux(e)) => Err(JsonRpcError::new(
            JsonRpcError::INTERNAL_ERROR,
            e.to_string(),
        )
        .with_data(json!({ "uri": uri, "error": e }))),
    }
}

fn prompts_get(ctx: &AppContext, params: &Value) -> Result<Value, JsonRpcError> {
    let name = required_str(params, "name")?;
    let empty = Map::new();
    let arguments = params["arguments"].as_object().unwrap_or(&empty);
    let rendered = render_prompt(name, arguments, &ctx.registry.config().cycle)
        .map_err(|e| JsonRpcError::new(JsonRpcError::INVALID_PARAMS, e.to_string()))?;
    serde_json::to_value(rendered)
        .map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}
