pub mod handler;
pub mod health;
pub mod protocol;
pub mod server;

pub use handler::{GatewayHandlers, handle_request, handle_socket};
pub use health::HealthSource;
pub use protocol::{
    CancelParams, CancelResult, ExecuteParams, ExecuteResult, PingResult, RpcErrorObject,
    RpcRequest, RpcResponse, notification_to_json,
};
pub use server::router;
