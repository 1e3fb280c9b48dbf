//! Outbound notification shapes (spec §4.9). These are the payloads the
//! RPC Handler serializes to the client; the Stream Pump, the Supervisor,
//! and the progress ticker are the only producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ExecutionId;
use crate::types::{Category, Complexity, OutputChunk};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Output(OutputChunk),
    Progress {
        execution_id: ExecutionId,
        bytes_out: u64,
        bytes_err: u64,
        elapsed_ms: u64,
        emitted_at: DateTime<Utc>,
    },
    Completed {
        execution_id: ExecutionId,
        exit_code: Option<i32>,
        signal: Option<String>,
        duration_ms: u64,
        category: Category,
        complexity: Complexity,
        timeout_hit: bool,
        cancel_reason: Option<String>,
        bytes_out: u64,
        bytes_err: u64,
        emitted_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Notification::Output(chunk) => chunk.execution_id,
            Notification::Progress { execution_id, .. } => *execution_id,
            Notification::Completed { execution_id, .. } => *execution_id,
        }
    }

    /// `completed` is the terminal notification for an execution: it must
    /// never be dropped by back-pressure (spec §8: "exactly one `completed`
    /// notification is emitted ... it is the last message bearing that id").
    pub fn is_terminal(&self) -> bool {
        matches!(self, Notification::Completed { .. })
    }

    /// Approximate wire-size in bytes, used for the session backlog cap
    /// (spec §3: "total buffered per session <= `max_session_backlog_bytes`").
    /// Output chunks count their payload; the other variants are small and
    /// fixed-size enough that an exact count isn't worth tracking.
    pub fn approx_bytes(&self) -> usize {
        match self {
            Notification::Output(chunk) => chunk.payload.len(),
            Notification::Progress { .. } => 64,
            Notification::Completed { .. } => 128,
        }
    }

    /// Mark this notification as truncated, if it carries an output chunk.
    /// No-op for `Progress`/`Completed`.
    pub fn mark_truncated(&mut self) {
        if let Notification::Output(chunk) = self {
            chunk.truncated = true;
        }
    }
}
