//! Axum wiring: a single `/ws` route that upgrades to the JSON-RPC
//! connection loop. `gatewayd` merges this router with the separate
//! `/health`/`/version` side-channel router.

use std::sync::Arc;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;

use crate::handler::{GatewayHandlers, handle_socket};

pub fn router<H: GatewayHandlers>(handlers: Arc<H>) -> Router {
    Router::new()
        .route("/ws", get(upgrade::<H>))
        .with_state(handlers)
}

async fn upgrade<H: GatewayHandlers>(
    ws: WebSocketUpgrade,
    State(handlers): State<Arc<H>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, handlers))
}
