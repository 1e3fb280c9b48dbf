pub mod error;
pub mod ids;
pub mod notification;
pub mod outbound;
pub mod types;

pub use error::GatewayError;
pub use ids::{ExecutionId, SessionId, new_execution_id, new_session_id};
pub use notification::Notification;
pub use outbound::{OutboundQueue, PushOutcome};
pub use types::{
    Category, Complexity, Execution, ExecutionState, HistoryRecord, HookPhase, HookSpec,
    OutputChunk, Session, SessionState, StreamKind,
};
