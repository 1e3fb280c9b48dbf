//! Bookkeeping the Supervisor keeps per in-flight (or just-finished)
//! execution, independent of the `Execution` record itself: the handle a
//! `cancel` call needs to reach a running [`crate::execution::run_execution`]
//! task, and the flag that lets a second `cancel` on the same id be answered
//! with `AlreadyTerminated` rather than `NotFound`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use gwd_core::{ExecutionId, SessionId};
use tokio_util::sync::CancellationToken;

pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    pub session_id: SessionId,
    pub cancel_token: CancellationToken,
    pub cancel_reason: Mutex<Option<String>>,
    pub ended: AtomicBool,
}

impl ExecutionHandle {
    pub fn new(execution_id: ExecutionId, session_id: SessionId) -> Self {
        Self {
            execution_id,
            session_id,
            cancel_token: CancellationToken::new(),
            cancel_reason: Mutex::new(None),
            ended: AtomicBool::new(false),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn mark_ended(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub fn request_cancel(&self, reason: Option<String>) {
        *self.cancel_reason.lock().unwrap() = Some(reason.unwrap_or_else(|| "client requested cancellation".to_string()));
        self.cancel_token.cancel();
    }

    pub fn take_cancel_reason(&self) -> Option<String> {
        self.cancel_reason.lock().unwrap().clone()
    }
}
