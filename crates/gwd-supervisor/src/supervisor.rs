//! The Supervisor: the glue that turns a bare RPC call into a running child
//! process and back into a `completed` notification. Modeled on this
//! workspace's hub `run_hub` orchestration — one long-lived object wiring
//! together the Session Manager, Hook Dispatcher, Timeout Estimator, Process
//! Manager, and Stream Pump, and handed to `gwd-rpc` as the single
//! `GatewayHandlers` implementation (spec §4.10).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gwd_classify::classify;
use gwd_config::GatewayConfig;
use gwd_core::{ExecutionId, GatewayError, Notification, SessionId};
use gwd_estimate::estimate;
use gwd_history::SharedHistoryStore;
use gwd_hooks::{HookDispatcher, PreHookOutcome};
use gwd_resource::ResourceMonitor;
use gwd_rpc::health::HealthSource;
use gwd_rpc::{ExecuteParams, GatewayHandlers};
use gwd_session::SessionRegistry;
use tokio::sync::RwLock;
use tracing::info;

use crate::execution::{ExecutionContext, run_execution};
use crate::handle::ExecutionHandle;

/// How long a terminated execution's handle is kept reachable by `cancel`
/// before being forgotten (spec §5's `AlreadyTerminated` contract implies
/// the id must resolve to *something* for a while after it ends, not
/// immediately fall back to `NotFound`).
const EXECUTION_HANDLE_RETENTION: Duration = Duration::from_secs(60);

pub struct Supervisor {
    sessions: Arc<SessionRegistry>,
    resource: Arc<ResourceMonitor>,
    config: Arc<GatewayConfig>,
    exec_ctx: Arc<ExecutionContext>,
    executions: Arc<RwLock<HashMap<ExecutionId, Arc<ExecutionHandle>>>>,
}

impl Supervisor {
    pub fn new(config: Arc<GatewayConfig>, history: SharedHistoryStore, hooks: Arc<HookDispatcher>) -> Self {
        let sessions = Arc::new(SessionRegistry::new(config.max_sessions));
        let resource = Arc::new(ResourceMonitor::start());
        let executions = Arc::new(RwLock::new(HashMap::new()));

        let exec_ctx = Arc::new(ExecutionContext {
            hooks,
            history,
            cleanup_timeout: Duration::from_secs(config.cleanup_timeout_secs),
            handle_retention: EXECUTION_HANDLE_RETENTION,
            executions: Arc::clone(&executions),
        });

        Self {
            sessions,
            resource,
            config,
            exec_ctx,
            executions,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Background task: close sessions idle past `session_idle_secs` (spec
    /// §4.8). Runs for the lifetime of the process; `gatewayd`'s `main`
    /// spawns this once at start-up.
    pub async fn run_housekeeping(&self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let idle_timeout = Duration::from_secs(self.config.session_idle_secs);
            for session_id in self.sessions.sweep_idle(idle_timeout).await {
                info!(%session_id, "closing idle session");
                self.on_disconnect(session_id).await;
            }
        }
    }

    /// Clean shutdown (spec §4.8): cancel every in-flight execution across
    /// every session, then close every session. Callers that want a graceful
    /// wind-down should await this before exiting the process.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ExecutionHandle>> = self.executions.read().await.values().cloned().collect();
        for handle in &handles {
            if !handle.is_ended() {
                handle.request_cancel(Some("server shutting down".to_string()));
            }
        }
        for session_id in self.sessions.all_session_ids().await {
            self.sessions.remove(session_id).await;
        }
    }
}

#[async_trait]
impl HealthSource for Supervisor {
    async fn session_count(&self) -> usize {
        self.sessions.len().await
    }
}

#[async_trait]
impl GatewayHandlers for Supervisor {
    async fn on_connect(&self) -> Result<SessionId, GatewayError> {
        let handle = self.sessions.create(self.config.max_session_backlog_bytes).await?;
        Ok(handle.session_id)
    }

    async fn on_disconnect(&self, session_id: SessionId) {
        self.sessions.remove(session_id).await;
        self.executions.write().await.retain(|_, h| h.session_id != session_id);
    }

    async fn touch(&self, session_id: SessionId) {
        if let Some(handle) = self.sessions.get(session_id).await {
            handle.touch().await;
        }
    }

    async fn execute(&self, session_id: SessionId, params: ExecuteParams) -> Result<ExecutionId, GatewayError> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| GatewayError::NotFound(session_id.to_string()))?;

        // Reserve the execution slot before doing any of the heavier work
        // below, so a busy session is rejected immediately rather than after
        // running the classifier and every matching pre-hook for nothing.
        let execution_id = gwd_core::new_execution_id();
        session.try_begin_execution(execution_id).await?;

        let classification = classify(&params.command);
        let load = self.resource.current_load();
        let timeout_estimate = estimate(
            &params.command,
            classification,
            self.exec_ctx.history.as_ref(),
            load,
            params.timeout_override,
        )
        .await;

        let mut hook_vars = HashMap::new();
        hook_vars.insert("session_id".to_string(), session_id.to_string());

        let pre_outcome = self.exec_ctx.hooks.run_pre(&params.command, &hook_vars).await;
        let (final_command, env_additions) = match pre_outcome {
            PreHookOutcome::Proceed { env_additions, command } => (command, env_additions),
            PreHookOutcome::Refused { hook, reason } => {
                // Release the slot we reserved above; the client never saw
                // this execution id, so there's nothing left to clean up.
                session.finish_execution().await;
                return Err(GatewayError::HookRefused { hook, reason });
            }
        };

        // Hooks may only add environment the client didn't already specify
        // itself; an explicit client override always wins (spec §9 merges
        // hook-vs-hook collisions last-writer-wins, but is silent on
        // hook-vs-client, so the more specific caller intent takes
        // precedence here).
        let mut env = params.env.clone();
        for (key, value) in env_additions {
            env.entry(key).or_insert(value);
        }

        let cwd = params.cwd.map(PathBuf::from);
        let mut execution = gwd_session::new_execution(
            session_id,
            final_command,
            env.clone(),
            cwd,
            classification.category,
            classification.complexity,
            timeout_estimate.execution_timeout_secs,
            timeout_estimate.stall_timeout_secs,
        );
        // `new_execution` mints its own id; overwrite it with the one
        // already reserved via `try_begin_execution` above so the session's
        // `current_execution` and this task's id agree.
        execution.execution_id = execution_id;

        let handle = Arc::new(ExecutionHandle::new(execution_id, session_id));
        self.executions.write().await.insert(execution_id, Arc::clone(&handle));

        let ctx = Arc::clone(&self.exec_ctx);
        let fingerprint = classification.name_hash;
        tokio::spawn(run_execution(ctx, session, execution, env, handle, hook_vars, fingerprint));

        Ok(execution_id)
    }

    async fn cancel(&self, _session_id: SessionId, execution_id: ExecutionId, reason: Option<String>) -> Result<bool, GatewayError> {
        let handle = self
            .executions
            .read()
            .await
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(execution_id.to_string()))?;

        if handle.is_ended() {
            return Err(GatewayError::AlreadyTerminated);
        }

        handle.request_cancel(reason);
        Ok(true)
    }

    async fn next_notification(&self, session_id: SessionId) -> Option<Notification> {
        let handle = self.sessions.get(session_id).await?;
        handle.outbound.recv().await
    }
}
