//! Stall detection (spec §4.7): fires when no output has arrived for
//! longer than `stall_timeout` while the child is presumed still running.
//! The watchdog only *signals*; per spec it "signals the Supervisor, not
//! the Process Manager directly" — the Supervisor is what decides to call
//! `terminate()`, typically by racing this future against pump-closed and
//! client-cancel in a `select!`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Resolves once `now - last_output_at > stall_timeout`. Never resolves on
/// its own otherwise — callers race it against the events that would make
/// it moot (pump EOF, process exit, cancellation) and abort it when one of
/// those wins.
pub async fn stall_watchdog(last_output_at_ms: Arc<AtomicI64>, stall_timeout: Duration) {
    let stall_timeout_ms = stall_timeout.as_millis() as i64;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let last = last_output_at_ms.load(Ordering::Relaxed);
        let now = Utc::now().timestamp_millis();
        if now - last > stall_timeout_ms {
            return;
        }
    }
}
