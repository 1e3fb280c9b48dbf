//! Opaque identifiers shared across the gateway.
//!
//! The source material calls these UUIDs; we use ULIDs instead since they
//! are lexically sortable by creation time (useful for log correlation) and
//! the workspace already standardizes on `ulid` for this exact contract.

/// Identifies a single client connection.
pub type SessionId = ulid::Ulid;

/// Identifies a single command invocation within a session.
pub type ExecutionId = ulid::Ulid;

pub fn new_session_id() -> SessionId {
    ulid::Ulid::new()
}

pub fn new_execution_id() -> ExecutionId {
    ulid::Ulid::new()
}
