//! The `Execution` state machine (spec §4.8):
//!
//! ```text
//!   [Queued] --accept--> [Running] --eof&wait--> [Completing] --post-hooks--> [Terminated]
//!      |                    |                                                   ^
//!      |                    +--stall/timeout/cancel--> [Killing] ---------------+
//!      +--hook-refused/spawn-failed--> [Terminated (error)]
//! ```
//!
//! Transitions are one-way except re-entry to `Killing`, which is
//! idempotent (a second cancel/watchdog-fire while already killing is a
//! no-op, not an error).

use gwd_core::ExecutionState;

#[derive(Debug, thiserror::Error)]
#[error("invalid execution state transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
}

/// Whether `to` is a legal next state from `from`.
pub fn is_legal_transition(from: ExecutionState, to: ExecutionState) -> bool {
    use ExecutionState::*;
    match (from, to) {
        (Queued, Running) => true,
        (Queued, Terminated) => true, // spawn-failed / hook-refused
        (Running, Completing) => true,
        (Running, Killing) => true,
        (Completing, Killing) => true,
        (Completing, Terminated) => true,
        (Killing, Terminated) => true,
        (Killing, Killing) => true, // idempotent re-entry
        _ => false,
    }
}

/// A small guard around `ExecutionState` that rejects illegal transitions
/// instead of silently clobbering state — every caller in `gwd-supervisor`
/// routes state changes through this rather than assigning the enum field
/// directly.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionStateMachine {
    current: ExecutionState,
}

impl ExecutionStateMachine {
    pub fn new() -> Self {
        Self { current: ExecutionState::Queued }
    }

    pub fn current(&self) -> ExecutionState {
        self.current
    }

    pub fn transition(&mut self, to: ExecutionState) -> Result<ExecutionState, InvalidTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(InvalidTransition { from: self.current, to });
        }
        self.current = to;
        Ok(self.current)
    }

    pub fn is_terminal(&self) -> bool {
        self.current == ExecutionState::Terminated
    }
}

impl Default for ExecutionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
