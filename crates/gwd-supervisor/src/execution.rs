//! The per-execution task: spawn -> pump -> watchdogs -> terminate/wait ->
//! post-hooks -> history -> `completed`, per spec §4.10's sequence. One of
//! these runs for every accepted `execute` call, concurrently with every
//! other session's execution and with its own session's RPC dispatch loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use gwd_core::{Execution, ExecutionId, ExecutionState, Notification, OutboundQueue};
use gwd_history::{Outcome, SharedHistoryStore};
use gwd_hooks::HookDispatcher;
use gwd_process::{ProcessHandle, TerminateOutcome};
use gwd_session::{ExecutionStateMachine, SessionHandle};
use gwd_stream::{PumpConfig, PumpHandles, run_pump, stall_watchdog};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::handle::ExecutionHandle;
use crate::signal::signal_name;

/// Shared services every execution task needs, independent of the specific
/// `execute` call that spawned it.
pub struct ExecutionContext {
    pub hooks: Arc<HookDispatcher>,
    pub history: SharedHistoryStore,
    pub cleanup_timeout: Duration,
    /// How long a terminated execution's handle stays reachable by `cancel`
    /// (answering with `AlreadyTerminated`) before it is forgotten.
    pub handle_retention: Duration,
    pub executions: Arc<RwLock<HashMap<ExecutionId, Arc<ExecutionHandle>>>>,
}

struct Resolution {
    exit_code: Option<i32>,
    signal: Option<String>,
    timeout_hit: bool,
    cancel_reason: Option<String>,
}

/// Run one execution end to end. Never panics on child failure; every
/// failure mode still produces exactly one terminal `completed` notification
/// and returns the session to `Idle` (spec §4.10, §8).
pub async fn run_execution(
    ctx: Arc<ExecutionContext>,
    session: Arc<SessionHandle>,
    mut execution: Execution,
    env: HashMap<String, String>,
    handle: Arc<ExecutionHandle>,
    hook_vars: HashMap<String, String>,
    fingerprint: u64,
) {
    // Every `execution.state` change in this function is routed through
    // this guard rather than assigned directly, so an illegal transition
    // (a logic bug, not a child-process failure) panics instead of
    // silently corrupting the state the `completed` notification reports.
    let mut machine = ExecutionStateMachine::new();

    let command = execution.command.clone();
    let resolution = match ProcessHandle::spawn(&command, execution.cwd.as_deref(), &env).await {
        Err(e) => {
            warn!(execution_id = %execution.execution_id, error = %e, "spawn failed");
            // Stays `Queued`; `finish` below drives the terminal
            // `Queued -> Terminated` transition for spawn failures.
            Resolution {
                exit_code: Some(-1),
                signal: None,
                timeout_hit: false,
                cancel_reason: Some(e.0),
            }
        }
        Ok((mut process, stdout, stderr)) => {
            execution.pgid = Some(process.pgid());
            execution.state = machine.transition(ExecutionState::Running).expect("Queued -> Running is always legal");
            info!(execution_id = %execution.execution_id, pgid = process.pgid(), command = %command, "execution started");

            let pump_handles = PumpHandles::new();
            let outbound = Arc::clone(&session.outbound);
            let pump_fut = run_pump(
                stdout,
                stderr,
                execution.execution_id,
                Arc::clone(&outbound),
                Arc::clone(&session.ring),
                pump_handles.clone(),
                PumpConfig::default(),
            );
            tokio::pin!(pump_fut);

            let stall_fut = stall_watchdog(
                Arc::clone(&pump_handles.last_output_at_ms),
                Duration::from_secs(execution.stall_timeout_secs),
            );
            tokio::pin!(stall_fut);

            let exec_timeout = tokio::time::sleep(Duration::from_secs(execution.execution_timeout_secs));
            tokio::pin!(exec_timeout);

            let progress_task = spawn_progress_ticker(
                Arc::clone(&outbound),
                pump_handles.clone(),
                execution.execution_id,
                execution.started_at,
            );

            let mut timeout_hit = false;
            let mut cancelled = false;

            tokio::select! {
                _ = &mut pump_fut => {}
                _ = &mut stall_fut => { timeout_hit = true; }
                _ = &mut exec_timeout => { timeout_hit = true; }
                _ = handle.cancel_token.cancelled() => { cancelled = true; }
            }
            progress_task.abort();

            let outcome = if timeout_hit || cancelled {
                execution.state = machine.transition(ExecutionState::Killing).expect("Running/Completing -> Killing is always legal");
                let grace = Duration::from_secs(5);
                let outcome = process.terminate(grace, ctx.cleanup_timeout).await;
                // Give the pipes a chance to report EOF after the kill so
                // the final lines of output aren't lost.
                let _ = tokio::time::timeout(ctx.cleanup_timeout + Duration::from_secs(2), &mut pump_fut).await;
                outcome
            } else {
                execution.state = machine.transition(ExecutionState::Completing).expect("Running -> Completing is always legal");
                TerminateOutcome::Reaped(process.wait().await)
            };

            execution.bytes_out = pump_handles.bytes_out.load(Ordering::Relaxed);
            execution.bytes_err = pump_handles.bytes_err.load(Ordering::Relaxed);

            let (exit_code, signal) = match outcome {
                TerminateOutcome::Reaped(exit) => (exit.exit_code, exit.signal.map(signal_name)),
                TerminateOutcome::Leaked => (None, Some("SIGKILL".to_string())),
            };

            Resolution {
                exit_code,
                signal,
                timeout_hit,
                cancel_reason: if cancelled { handle.take_cancel_reason() } else { None },
            }
        }
    };

    finish(&ctx, &session, &mut execution, &handle, resolution, fingerprint, machine).await;

    let mut run_vars = hook_vars;
    run_vars.insert("exit_code".to_string(), execution.exit_code.map(|c| c.to_string()).unwrap_or_default());
    ctx.hooks.run_post(&execution, &run_vars).await;
}

async fn finish(
    ctx: &Arc<ExecutionContext>,
    session: &Arc<SessionHandle>,
    execution: &mut Execution,
    handle: &Arc<ExecutionHandle>,
    resolution: Resolution,
    fingerprint: u64,
    mut machine: ExecutionStateMachine,
) {
    execution.exit_code = resolution.exit_code;
    execution.signal = resolution.signal.clone();
    execution.ended_at = Some(Utc::now());
    execution.cancel_reason = resolution.cancel_reason.clone();
    execution.timeout_hit = resolution.timeout_hit;
    execution.state = machine
        .transition(ExecutionState::Terminated)
        .expect("every reachable state transitions to Terminated");

    let duration_ms = (execution.ended_at.unwrap() - execution.started_at)
        .num_milliseconds()
        .max(0) as u64;

    let history_outcome = if resolution.timeout_hit { Outcome::TimedOut } else { Outcome::Completed };
    ctx.history.record(execution.category, fingerprint, duration_ms, history_outcome).await;

    let completed = Notification::Completed {
        execution_id: execution.execution_id,
        exit_code: execution.exit_code,
        signal: execution.signal.clone(),
        duration_ms,
        category: execution.category,
        complexity: execution.complexity,
        timeout_hit: execution.timeout_hit,
        cancel_reason: execution.cancel_reason.clone(),
        bytes_out: execution.bytes_out,
        bytes_err: execution.bytes_err,
        emitted_at: Utc::now(),
    };
    // `completed` is terminal and must never be dropped; the backpressure
    // ceiling here is generous rather than load-bearing.
    session.outbound.push(completed, Duration::from_secs(5)).await;

    handle.mark_ended();
    session.finish_execution().await;

    info!(
        execution_id = %execution.execution_id,
        exit_code = execution.exit_code,
        timeout_hit = execution.timeout_hit,
        "execution finished"
    );

    let executions = Arc::clone(&ctx.executions);
    let execution_id = execution.execution_id;
    let retention = ctx.handle_retention;
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        executions.write().await.remove(&execution_id);
    });
}

fn spawn_progress_ticker(
    outbound: Arc<OutboundQueue>,
    handles: PumpHandles,
    execution_id: ExecutionId,
    started_at: chrono::DateTime<Utc>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let bytes_out = handles.bytes_out.load(Ordering::Relaxed);
            let bytes_err = handles.bytes_err.load(Ordering::Relaxed);
            let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
            let progress = Notification::Progress {
                execution_id,
                bytes_out,
                bytes_err,
                elapsed_ms,
                emitted_at: Utc::now(),
            };
            outbound.push(progress, Duration::from_millis(100)).await;
        }
    })
}
