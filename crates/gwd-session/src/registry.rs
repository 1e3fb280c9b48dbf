//! The Session Manager (spec §4.8): admits connections under a capacity
//! cap, enforces one execution per session, and reaps idle sessions.
//!
//! The session map is read-mostly — accept/close are the only writers,
//! RPC dispatch only ever reads to find a handle and then operates on that
//! handle's own interior-mutable state (spec §5: "Sessions mapping:
//! single-writer (Accept/Close) with concurrent readers (RPC dispatch)").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gwd_core::{Execution, ExecutionId, GatewayError, OutboundQueue, Session, SessionId, SessionState};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::ring::OutputRing;

/// Everything a connected client owns at runtime: the plain-data `Session`
/// record, its outbound notification queue, and its capped replay ring. The
/// ring is `Arc`-wrapped like `outbound` so the stream pump (which writes
/// into it alongside every `output` notification it emits) can hold its own
/// clone without borrowing the whole `SessionHandle`.
pub struct SessionHandle {
    pub session_id: SessionId,
    state: RwLock<Session>,
    pub outbound: Arc<OutboundQueue>,
    pub ring: Arc<tokio::sync::Mutex<OutputRing>>,
}

impl SessionHandle {
    fn new(max_backlog_bytes: usize) -> Self {
        let session_id = gwd_core::new_session_id();
        Self {
            session_id,
            state: RwLock::new(Session::new(session_id)),
            outbound: Arc::new(OutboundQueue::new(max_backlog_bytes)),
            ring: Arc::new(tokio::sync::Mutex::new(OutputRing::new(max_backlog_bytes))),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn touch(&self) {
        let mut guard = self.state.write().await;
        guard.last_activity_at = Utc::now();
        guard.inbound_cursor += 1;
    }

    /// Admit a new execution if, and only if, the session is currently
    /// `Idle` (spec §4.8: "submitting `execute` while `state != Idle`
    /// yields `Busy`").
    pub async fn try_begin_execution(&self, execution_id: ExecutionId) -> Result<(), GatewayError> {
        let mut guard = self.state.write().await;
        if guard.state != SessionState::Idle {
            return Err(GatewayError::Busy);
        }
        guard.state = SessionState::Executing;
        guard.current_execution = Some(execution_id);
        drop(guard);
        self.ring.lock().await.clear();
        Ok(())
    }

    pub async fn mark_completing(&self) {
        let mut guard = self.state.write().await;
        guard.state = SessionState::Completing;
    }

    /// Return the session to `Idle`, clearing the in-flight execution.
    pub async fn finish_execution(&self) {
        let mut guard = self.state.write().await;
        guard.state = SessionState::Idle;
        guard.current_execution = None;
    }

    pub async fn current_execution(&self) -> Option<ExecutionId> {
        self.state.read().await.current_execution
    }

    pub async fn close(&self) {
        let mut guard = self.state.write().await;
        guard.state = SessionState::Closed;
        self.outbound.close();
    }

    pub async fn is_idle_past(&self, idle_timeout: Duration) -> bool {
        let guard = self.state.read().await;
        guard.state == SessionState::Idle
            && Utc::now().signed_duration_since(guard.last_activity_at)
                > chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::zero())
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Admit a new connection, refusing it once the registry is at
    /// capacity (spec §4.8's `CapacityExceeded`, enforced "at the RPC
    /// layer" per spec but centralized here so both the RPC handler and
    /// tests share one source of truth).
    pub async fn create(&self, max_backlog_bytes: usize) -> Result<Arc<SessionHandle>, GatewayError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(GatewayError::CapacityExceeded);
        }
        let handle = Arc::new(SessionHandle::new(max_backlog_bytes));
        sessions.insert(handle.session_id, Arc::clone(&handle));
        debug!(session_id = %handle.session_id, total = sessions.len(), "session admitted");
        Ok(handle)
    }

    pub async fn get(&self, session_id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn remove(&self, session_id: SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().await.remove(&session_id);
        if let Some(handle) = &removed {
            handle.close().await;
            info!(session_id = %session_id, "session closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_at_capacity(&self) -> bool {
        self.sessions.read().await.len() >= self.max_sessions
    }

    /// Find every session idle past `idle_timeout`. The caller (the
    /// Supervisor's housekeeping loop) is responsible for actually closing
    /// them via [`SessionRegistry::remove`] — this only identifies victims.
    pub async fn sweep_idle(&self, idle_timeout: Duration) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        let mut idle = Vec::new();
        for (id, handle) in sessions.iter() {
            if handle.is_idle_past(idle_timeout).await {
                idle.push(*id);
            }
        }
        idle
    }

    /// Close every open session, used on server shutdown (spec §4.8:
    /// "every session's current execution is cancelled via the normal
    /// cancellation path" — cancellation itself is the Supervisor's job;
    /// this only returns the ids so the Supervisor can drive that path
    /// and then remove each one).
    pub async fn all_session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}

/// Build the `Execution` record for a freshly admitted command. Kept here
/// (rather than in `gwd-supervisor`) since it is pure data construction
/// shared by every caller that starts an execution.
pub fn new_execution(
    session_id: SessionId,
    command: String,
    env_overrides: HashMap<String, String>,
    cwd: Option<std::path::PathBuf>,
    category: gwd_core::Category,
    complexity: gwd_core::Complexity,
    execution_timeout_secs: u64,
    stall_timeout_secs: u64,
) -> Execution {
    let now = Utc::now();
    Execution {
        execution_id: gwd_core::new_execution_id(),
        session_id,
        command,
        env_overrides,
        cwd,
        started_at: now,
        ended_at: None,
        exit_code: None,
        signal: None,
        category,
        complexity,
        execution_timeout_secs,
        stall_timeout_secs,
        pgid: None,
        bytes_out: 0,
        bytes_err: 0,
        last_output_at: now,
        cancel_reason: None,
        timeout_hit: false,
        state: gwd_core::ExecutionState::Queued,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capacity_cap_refuses_new_sessions_once_full() {
        let registry = SessionRegistry::new(2);
        registry.create(1024).await.unwrap();
        registry.create(1024).await.unwrap();
        let result = registry.create(1024).await;
        assert!(matches!(result, Err(GatewayError::CapacityExceeded)));
    }

    #[tokio::test]
    async fn removing_a_session_frees_capacity() {
        let registry = SessionRegistry::new(1);
        let handle = registry.create(1024).await.unwrap();
        assert!(registry.create(1024).await.is_err());
        registry.remove(handle.session_id).await;
        assert!(registry.create(1024).await.is_ok());
    }

    #[tokio::test]
    async fn one_execution_per_session_is_enforced() {
        let registry = SessionRegistry::new(10);
        let handle = registry.create(1024).await.unwrap();
        let exec_id = gwd_core::new_execution_id();
        handle.try_begin_execution(exec_id).await.unwrap();
        let second = gwd_core::new_execution_id();
        let result = handle.try_begin_execution(second).await;
        assert!(matches!(result, Err(GatewayError::Busy)));
    }

    #[tokio::test]
    async fn finishing_an_execution_returns_session_to_idle() {
        let registry = SessionRegistry::new(10);
        let handle = registry.create(1024).await.unwrap();
        let exec_id = gwd_core::new_execution_id();
        handle.try_begin_execution(exec_id).await.unwrap();
        handle.finish_execution().await;
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(snapshot.current_execution.is_none());
        // A fresh execution should now be admissible again.
        assert!(handle.try_begin_execution(exec_id).await.is_ok());
    }

    #[tokio::test]
    async fn idle_sweep_finds_sessions_past_timeout() {
        let registry = SessionRegistry::new(10);
        let handle = registry.create(1024).await.unwrap();
        assert!(registry.sweep_idle(Duration::from_secs(0)).await.contains(&handle.session_id));
        assert!(registry.sweep_idle(Duration::from_secs(3600)).await.is_empty());
    }

    #[tokio::test]
    async fn executing_sessions_are_never_swept_as_idle() {
        let registry = SessionRegistry::new(10);
        let handle = registry.create(1024).await.unwrap();
        handle.try_begin_execution(gwd_core::new_execution_id()).await.unwrap();
        assert!(registry.sweep_idle(Duration::from_secs(0)).await.is_empty());
    }
}
