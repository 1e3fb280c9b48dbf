//! The RPC Handler's connection loop: one task per WebSocket, each
//! WebSocket being exactly one [`gwd_core::Session`] (spec §4.9, §6).
//!
//! Framing, JSON parsing, and dispatch live here; everything the methods
//! actually *do* is delegated to a [`GatewayHandlers`] implementation
//! (provided by `gwd-supervisor`) so this crate has no knowledge of
//! sessions, processes, or hooks beyond the wire contract.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use gwd_core::{ExecutionId, GatewayError, Notification, SessionId};
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{
    CancelParams, CancelResult, ExecuteParams, ExecuteResult, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PingResult, RpcRequest, RpcResponse, notification_to_json,
};

/// Everything the RPC layer needs from the rest of the gateway. Implemented
/// by the Supervisor; this trait is the seam between wire protocol and
/// business logic (spec §9: "pass a `Server` context object explicitly to
/// every component").
#[async_trait]
pub trait GatewayHandlers: Send + Sync + 'static {
    /// Admit a new connection. `Err` means the server is at capacity.
    async fn on_connect(&self) -> Result<SessionId, GatewayError>;
    async fn on_disconnect(&self, session_id: SessionId);
    async fn touch(&self, session_id: SessionId);
    async fn execute(&self, session_id: SessionId, params: ExecuteParams) -> Result<ExecutionId, GatewayError>;
    async fn cancel(&self, session_id: SessionId, execution_id: ExecutionId, reason: Option<String>) -> Result<bool, GatewayError>;
    /// Pop the next outbound notification for this session, waiting if
    /// none is queued yet. Returns `None` once the session has closed.
    async fn next_notification(&self, session_id: SessionId) -> Option<Notification>;
}

pub const MAX_FRAME_BYTES: usize = crate::protocol::DEFAULT_MAX_FRAME_BYTES;

/// Drive one WebSocket connection end to end: admit, loop inbound/outbound
/// concurrently, disconnect on close or capacity refusal.
///
/// One writer task owns the socket's send half, merging two sources:
/// request/response replies (via an internal channel) and outbound
/// notifications drained from the session's queue. Splitting reads from
/// writes lets a slow client's inbound frames never block outbound
/// progress/output notifications, and vice versa.
pub async fn handle_socket<H: GatewayHandlers>(socket: WebSocket, handlers: Arc<H>) {
    let session_id = match handlers.on_connect().await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "connection refused");
            return;
        }
    };

    let (mut sender, mut receiver) = futures_util::StreamExt::split(socket);
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let writer_handlers = Arc::clone(&handlers);
    let writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                reply = reply_rx.recv() => {
                    match reply {
                        Some(text) => {
                            if futures_util::SinkExt::send(&mut sender, Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                notification = writer_handlers.next_notification(session_id) => {
                    match notification {
                        Some(n) => {
                            let json = notification_to_json(&n);
                            let Ok(text) = serde_json::to_string(&json) else { continue };
                            if futures_util::SinkExt::send(&mut sender, Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    loop {
        let Some(message) = futures_util::StreamExt::next(&mut receiver).await else {
            break;
        };
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "websocket read error");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                handlers.touch(session_id).await;
                if text.len() > MAX_FRAME_BYTES {
                    continue;
                }
                // Each frame is dispatched independently; a malformed frame
                // never tears down the connection (spec §7: "recover
                // locally wherever the contract permits a defined result").
                if let Some(response) = handle_request(handlers.as_ref(), session_id, &text).await {
                    if let Ok(text) = serde_json::to_string(&response) {
                        let _ = reply_tx.send(text);
                    }
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) => {
                // Spec §6: "Text frames only; no binary frames." Ignored
                // rather than torn down, consistent with the rest of the
                // frame-level error handling here.
                debug!(session_id = %session_id, "ignoring binary frame");
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    writer_task.abort();
    handlers.on_disconnect(session_id).await;
}

/// Parse one frame and produce the JSON-RPC response object, without
/// touching the socket — the pure, testable core of the dispatch loop.
pub async fn handle_request<H: GatewayHandlers>(
    handlers: &H,
    session_id: SessionId,
    text: &str,
) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            return Some(RpcResponse::error(Value::Null, crate::protocol::PARSE_ERROR, format!("invalid JSON: {e}")));
        }
    };

    let id = request.id.clone().unwrap_or(Value::Null);

    if request.method.trim().is_empty() {
        return Some(RpcResponse::error(id, INVALID_REQUEST, "missing method".to_string()));
    }
    if let Some(version) = &request.jsonrpc {
        if version != "2.0" {
            return Some(RpcResponse::error(id, INVALID_REQUEST, format!("unsupported jsonrpc version '{version}'")));
        }
    }

    match request.method.as_str() {
        "execute" => {
            let params: ExecuteParams = match serde_json::from_value(request.params) {
                Ok(p) => p,
                Err(e) => return Some(RpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {e}"))),
            };
            match handlers.execute(session_id, params).await {
                Ok(execution_id) => {
                    let result = ExecuteResult { execution_id };
                    Some(RpcResponse::success(id, serde_json::to_value(result).unwrap()))
                }
                Err(e) => Some(RpcResponse::from_gateway_error(id, &e)),
            }
        }
        "cancel" => {
            let params: CancelParams = match serde_json::from_value(request.params) {
                Ok(p) => p,
                Err(e) => return Some(RpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {e}"))),
            };
            match handlers.cancel(session_id, params.execution_id, params.reason).await {
                Ok(cancelled) => {
                    let result = CancelResult { cancelled };
                    Some(RpcResponse::success(id, serde_json::to_value(result).unwrap()))
                }
                Err(e) => Some(RpcResponse::from_gateway_error(id, &e)),
            }
        }
        "ping" => {
            let result = PingResult { pong: chrono::Utc::now().timestamp_millis() };
            Some(RpcResponse::success(id, serde_json::to_value(result).unwrap()))
        }
        _ => Some(RpcResponse::error(id, METHOD_NOT_FOUND, format!("unknown method '{}'", request.method))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeHandlers {
        execute_result: Result<ExecutionId, GatewayError>,
        notifications: Mutex<VecDeque<Notification>>,
    }

    #[async_trait]
    impl GatewayHandlers for FakeHandlers {
        async fn on_connect(&self) -> Result<SessionId, GatewayError> {
            Ok(gwd_core::new_session_id())
        }
        async fn on_disconnect(&self, _session_id: SessionId) {}
        async fn touch(&self, _session_id: SessionId) {}
        async fn execute(&self, _session_id: SessionId, _params: ExecuteParams) -> Result<ExecutionId, GatewayError> {
            self.execute_result.clone()
        }
        async fn cancel(&self, _session_id: SessionId, _execution_id: ExecutionId, _reason: Option<String>) -> Result<bool, GatewayError> {
            Ok(true)
        }
        async fn next_notification(&self, _session_id: SessionId) -> Option<Notification> {
            self.notifications.lock().unwrap().pop_front()
        }
    }

    #[tokio::test]
    async fn execute_dispatches_and_returns_execution_id() {
        let execution_id = gwd_core::new_execution_id();
        let handlers = FakeHandlers {
            execute_result: Ok(execution_id),
            notifications: Mutex::new(VecDeque::new()),
        };
        let session_id = gwd_core::new_session_id();
        let text = r#"{"jsonrpc":"2.0","id":1,"method":"execute","params":{"command":"echo hi"}}"#;
        let response = handle_request(&handlers, session_id, text).await.unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["execution_id"], serde_json::to_value(execution_id).unwrap());
    }

    #[tokio::test]
    async fn busy_error_maps_to_code_1000() {
        let handlers = FakeHandlers {
            execute_result: Err(GatewayError::Busy),
            notifications: Mutex::new(VecDeque::new()),
        };
        let session_id = gwd_core::new_session_id();
        let text = r#"{"jsonrpc":"2.0","id":1,"method":"execute","params":{"command":"echo hi"}}"#;
        let response = handle_request(&handlers, session_id, text).await.unwrap();
        assert_eq!(response.error.unwrap().code, 1000);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let handlers = FakeHandlers {
            execute_result: Ok(gwd_core::new_execution_id()),
            notifications: Mutex::new(VecDeque::new()),
        };
        let session_id = gwd_core::new_session_id();
        let text = r#"{"jsonrpc":"2.0","id":1,"method":"bogus"}"#;
        let response = handle_request(&handlers, session_id, text).await.unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let handlers = FakeHandlers {
            execute_result: Ok(gwd_core::new_execution_id()),
            notifications: Mutex::new(VecDeque::new()),
        };
        let session_id = gwd_core::new_session_id();
        let response = handle_request(&handlers, session_id, "not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, crate::protocol::PARSE_ERROR);
    }

    #[tokio::test]
    async fn missing_method_is_invalid_request() {
        let handlers = FakeHandlers {
            execute_result: Ok(gwd_core::new_execution_id()),
            notifications: Mutex::new(VecDeque::new()),
        };
        let session_id = gwd_core::new_session_id();
        let response = handle_request(&handlers, session_id, r#"{"jsonrpc":"2.0","id":1,"method":""}"#).await.unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn ping_returns_promptly() {
        let handlers = FakeHandlers {
            execute_result: Ok(gwd_core::new_execution_id()),
            notifications: Mutex::new(VecDeque::new()),
        };
        let session_id = gwd_core::new_session_id();
        let start = std::time::Instant::now();
        let response = handle_request(&handlers, session_id, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await.unwrap();
        assert!(response.error.is_none());
        assert!(start.elapsed() < std::time::Duration::from_millis(100));
    }
}
