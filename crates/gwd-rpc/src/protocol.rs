//! JSON-RPC 2.0 message shapes for the gateway's wire protocol (spec §4.9,
//! §6). Text frames only, one WebSocket per [`gwd_core::Session`].

use std::collections::HashMap;

use base64::Engine;
use gwd_core::{ExecutionId, GatewayError, Notification};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest single WebSocket text frame accepted (spec §6 default).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcErrorObject { code, message: message.into() }),
        }
    }

    pub fn from_gateway_error(id: Value, err: &GatewayError) -> Self {
        Self::error(id, err.code(), err.to_string())
    }
}

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteParams {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub timeout_override: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResult {
    pub execution_id: ExecutionId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelParams {
    pub execution_id: ExecutionId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResult {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub pong: i64,
}

/// Render a server->client notification as a JSON-RPC 2.0 notification
/// object (no `id`). `output` payloads are base64-encoded bytes per spec
/// §4.9.
pub fn notification_to_json(notification: &Notification) -> Value {
    match notification {
        Notification::Output(chunk) => serde_json::json!({
            "jsonrpc": "2.0",
            "method": "output",
            "params": {
                "execution_id": chunk.execution_id,
                "stream": chunk.stream,
                "sequence": chunk.sequence,
                "payload_b64": base64::engine::general_purpose::STANDARD.encode(&chunk.payload),
                "truncated": chunk.truncated,
            }
        }),
        Notification::Progress { execution_id, bytes_out, bytes_err, elapsed_ms, .. } => serde_json::json!({
            "jsonrpc": "2.0",
            "method": "progress",
            "params": {
                "execution_id": execution_id,
                "bytes_out": bytes_out,
                "bytes_err": bytes_err,
                "elapsed_ms": elapsed_ms,
            }
        }),
        Notification::Completed {
            execution_id,
            exit_code,
            signal,
            duration_ms,
            category,
            complexity,
            timeout_hit,
            cancel_reason,
            bytes_out,
            bytes_err,
            ..
        } => serde_json::json!({
            "jsonrpc": "2.0",
            "method": "completed",
            "params": {
                "execution_id": execution_id,
                "exit_code": exit_code,
                "signal": signal,
                "duration_ms": duration_ms,
                "category": category,
                "complexity": complexity,
                "timeout_hit": timeout_hit,
                "cancel_reason": cancel_reason,
                "bytes_out": bytes_out,
                "bytes_err": bytes_err,
            }
        }),
    }
}
