use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionId, SessionId};

/// Coarse task family assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Calculation,
    Code,
    Data,
    File,
    General,
    Unknown,
}

/// Ordered complexity tier. Declaration order is the ordering relation
/// (`Trivial < Low < Medium < High < Extreme`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Per-connection lifecycle state. See `gwd-session::state` for the
/// transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Executing,
    Completing,
    Closed,
}

/// Per-execution lifecycle state, per the state machine in spec §4.8:
/// `Queued -> Running -> Completing -> Terminated`, with `Killing` reachable
/// from `Running` or `Completing` and re-entrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Queued,
    Running,
    Completing,
    Killing,
    Terminated,
}

/// A single client connection. At most one [`Execution`] may be in flight
/// per session at any time.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    pub current_execution: Option<ExecutionId>,
    pub inbound_cursor: u64,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            state: SessionState::Idle,
            current_execution: None,
            inbound_cursor: 0,
            last_activity_at: now,
        }
    }
}

/// A single invocation of a child command within a session.
#[derive(Debug, Clone)]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub session_id: SessionId,
    pub command: String,
    pub env_overrides: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub category: Category,
    pub complexity: Complexity,
    pub execution_timeout_secs: u64,
    pub stall_timeout_secs: u64,
    pub pgid: Option<i32>,
    pub bytes_out: u64,
    pub bytes_err: u64,
    pub last_output_at: DateTime<Utc>,
    pub cancel_reason: Option<String>,
    pub timeout_hit: bool,
    pub state: ExecutionState,
}

impl Execution {
    /// True once `ended_at` has been set; no further output chunks may be
    /// emitted for this execution after that point.
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// One chunk of child output, already bounded and sequenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChunk {
    pub execution_id: ExecutionId,
    pub stream: StreamKind,
    pub sequence: u64,
    pub payload: Vec<u8>,
    pub emitted_at: DateTime<Utc>,
    pub truncated: bool,
}

/// Historical runtime record keyed by [`crate::classify::Fingerprint`]
/// (defined in `gwd-classify`, referenced here only by its raw `u64` form
/// to avoid a dependency cycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub fingerprint: u64,
    pub samples_ms: VecDeque<u64>,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub timeouts: u64,
    pub updated_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub const MAX_SAMPLES: usize = 20;

    pub fn new(fingerprint: u64) -> Self {
        Self {
            fingerprint,
            samples_ms: VecDeque::new(),
            p50_ms: 0,
            p90_ms: 0,
            timeouts: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    Pre,
    Post,
}

/// Read-only hook configuration loaded at start-up; never mutated after load.
///
/// `env_additions` and `command_wrap` are the "mutation" a hook contributes
/// on success (spec §4.5): statically declared here rather than parsed back
/// out of the hook subprocess's stdout, consistent with a `HookSpec` being
/// read-only config. The subprocess itself is the side-effecting/validating
/// gate; what it gates is fixed at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSpec {
    pub phase: HookPhase,
    pub name: String,
    /// Regex evaluated against the raw command to decide whether this hook
    /// fires.
    pub trigger: String,
    pub command_template: String,
    #[serde(default = "default_hook_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub required: bool,
    /// Environment entries to add when this hook succeeds. Merged across
    /// hooks with last-writer-wins on key collision (spec §9).
    #[serde(default)]
    pub env_additions: HashMap<String, String>,
    /// An optional `{command}`-templated wrapper applied when this hook
    /// succeeds. Multiple wraps compose in declaration order (spec §9).
    #[serde(default)]
    pub command_wrap: Option<String>,
}

fn default_hook_timeout() -> u64 {
    10
}
