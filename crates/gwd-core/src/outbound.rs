//! The bounded, single-consumer outbound queue each [`crate::Session`] owns
//! (spec §3 `outbound_queue`, §4.7's back-pressure rule, §5's "multiple
//! producers -> single consumer" shared resource).
//!
//! Two independent stream-pump drains and a periodic progress ticker push
//! into this queue; the RPC writer task is the sole consumer. When the
//! queue is full, producers sleep up to `backpressure_max` before the queue
//! starts dropping its oldest droppable entries to make room — the pump
//! itself must never block on a full queue forever, only the producer call
//! that's pushing into it.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::warn;

use crate::notification::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued without needing to drop anything.
    Enqueued,
    /// Enqueued, but only after dropping one or more older droppable
    /// entries to make room.
    Truncated { dropped: usize },
}

struct Inner {
    queue: VecDeque<Notification>,
    bytes: usize,
    closed: bool,
}

pub struct OutboundQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    max_bytes: usize,
}

impl OutboundQueue {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                bytes: 0,
                closed: false,
            }),
            notify: Notify::new(),
            max_bytes,
        }
    }

    /// Push one notification, applying spec §4.7's back-pressure ladder:
    /// wait for room up to `backpressure_max`, then drop the oldest
    /// droppable (non-terminal) entries until the new one fits, marking it
    /// truncated if it's an output chunk. The push itself never blocks
    /// past `backpressure_max` — this is the mechanism that keeps a stalled
    /// client from ever blocking the child process pipe forever.
    pub async fn push(&self, mut item: Notification, backpressure_max: Duration) -> PushOutcome {
        let item_bytes = item.approx_bytes();
        let deadline = Instant::now() + backpressure_max;

        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.closed {
                    return PushOutcome::Enqueued;
                }
                if item.is_terminal() || guard.bytes + item_bytes <= self.max_bytes {
                    guard.queue.push_back(item);
                    guard.bytes += item_bytes;
                    drop(guard);
                    self.notify.notify_one();
                    return PushOutcome::Enqueued;
                }
            }

            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20).min(backpressure_max)).await;
        }

        let mut guard = self.inner.lock().await;
        let mut dropped = 0usize;
        while guard.bytes + item_bytes > self.max_bytes {
            let Some(front_is_droppable) = guard.queue.front().map(|n| !n.is_terminal()) else {
                break;
            };
            if !front_is_droppable {
                break;
            }
            if let Some(old) = guard.queue.pop_front() {
                guard.bytes = guard.bytes.saturating_sub(old.approx_bytes());
                dropped += 1;
            }
        }

        if dropped > 0 {
            warn!(dropped, "outbound queue backlog full, dropped oldest entries");
            item.mark_truncated();
        }

        guard.queue.push_back(item);
        guard.bytes += item_bytes;
        drop(guard);
        self.notify.notify_one();

        if dropped > 0 {
            PushOutcome::Truncated { dropped }
        } else {
            PushOutcome::Enqueued
        }
    }

    /// Pop the next notification, waiting if the queue is momentarily
    /// empty. Returns `None` once the queue has been closed and drained.
    pub async fn recv(&self) -> Option<Notification> {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.queue.pop_front() {
                    guard.bytes = guard.bytes.saturating_sub(item.approx_bytes());
                    return Some(item);
                }
                if guard.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark the queue closed; a pending or future `recv` drains whatever
    /// remains, then returns `None`.
    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.try_lock() {
            guard.closed = true;
        }
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_execution_id;
    use crate::types::{OutputChunk, StreamKind};
    use chrono::Utc;

    fn chunk(execution_id: crate::ids::ExecutionId, sequence: u64, payload: &[u8]) -> Notification {
        Notification::Output(OutputChunk {
            execution_id,
            stream: StreamKind::Stdout,
            sequence,
            payload: payload.to_vec(),
            emitted_at: Utc::now(),
            truncated: false,
        })
    }

    #[tokio::test]
    async fn push_and_recv_round_trip() {
        let queue = OutboundQueue::new(1024);
        let exec = new_execution_id();
        let outcome = queue.push(chunk(exec, 0, b"hello"), Duration::from_millis(50)).await;
        assert_eq!(outcome, PushOutcome::Enqueued);
        let received = queue.recv().await.unwrap();
        assert_eq!(received.execution_id(), exec);
    }

    #[tokio::test]
    async fn terminal_notifications_are_never_dropped() {
        let queue = OutboundQueue::new(16);
        let exec = new_execution_id();
        // Fill well past capacity with terminal pushes; none should be lost.
        for _ in 0..5 {
            let completed = Notification::Completed {
                execution_id: exec,
                exit_code: Some(0),
                signal: None,
                duration_ms: 0,
                category: crate::Category::General,
                complexity: crate::Complexity::Trivial,
                timeout_hit: false,
                cancel_reason: None,
                bytes_out: 0,
                bytes_err: 0,
                emitted_at: Utc::now(),
            };
            queue.push(completed, Duration::from_millis(10)).await;
        }
        assert_eq!(queue.len().await, 5);
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_and_marks_truncated() {
        let queue = OutboundQueue::new(32);
        let exec = new_execution_id();
        for seq in 0..10u64 {
            queue.push(chunk(exec, seq, b"0123456789"), Duration::from_millis(10)).await;
        }
        // The queue should have dropped older entries rather than grow
        // unbounded, and the surviving newest entry should be marked
        // truncated.
        assert!(queue.len().await <= 4);
        let mut saw_truncated = false;
        while let Some(item) = queue.recv().await {
            if let Notification::Output(c) = &item {
                if c.truncated {
                    saw_truncated = true;
                }
            }
            if queue.len().await == 0 {
                break;
            }
        }
        assert!(saw_truncated, "at least one surviving chunk should be marked truncated");
    }

    #[tokio::test]
    async fn close_drains_then_returns_none() {
        let queue = OutboundQueue::new(1024);
        let exec = new_execution_id();
        queue.push(chunk(exec, 0, b"x"), Duration::from_millis(10)).await;
        queue.close();
        assert!(queue.recv().await.is_some());
        assert!(queue.recv().await.is_none());
    }
}
