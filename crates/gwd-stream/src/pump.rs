//! The Stream Pump: two independent drains (stdout, stderr) that run
//! concurrently with the child, never block it, and forward output as
//! sequenced, bounded [`gwd_core::OutputChunk`]s (spec §4.7).

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use gwd_core::{ExecutionId, Notification, OutboundQueue, OutputChunk, StreamKind};
use gwd_session::OutputRing;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::binary::{DEFAULT_BINARY_THRESHOLD, redact_if_binary};

#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Largest single read from the pipe (spec §4.7 step 1 default).
    pub read_chunk: usize,
    /// How long a partial (no-newline-yet) line is buffered before being
    /// flushed anyway, to preserve interactivity (spec §4.7 step 2 default).
    pub flush_interval: Duration,
    /// Threshold above which a non-UTF-8 chunk is redacted (spec §4.7 step 5).
    pub binary_threshold: usize,
    /// Ceiling a producer will wait for outbound queue room before the
    /// queue starts dropping old entries (spec §4.7 step 6 default).
    pub backpressure_max: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            read_chunk: 64 * 1024,
            flush_interval: Duration::from_millis(50),
            binary_threshold: DEFAULT_BINARY_THRESHOLD,
            backpressure_max: Duration::from_secs(1),
        }
    }
}

/// Shared counters a drain updates as it runs, read by the Supervisor's
/// stall watchdog and progress ticker.
#[derive(Clone)]
pub struct PumpHandles {
    pub last_output_at_ms: Arc<AtomicI64>,
    pub bytes_out: Arc<AtomicU64>,
    pub bytes_err: Arc<AtomicU64>,
}

impl PumpHandles {
    pub fn new() -> Self {
        Self {
            last_output_at_ms: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
            bytes_out: Arc::new(AtomicU64::new(0)),
            bytes_err: Arc::new(AtomicU64::new(0)),
        }
    }

    fn counter_for(&self, stream: StreamKind) -> &Arc<AtomicU64> {
        match stream {
            StreamKind::Stdout => &self.bytes_out,
            StreamKind::Stderr => &self.bytes_err,
        }
    }
}

impl Default for PumpHandles {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a single pipe to EOF, splitting on newlines and flushing partial
/// lines on `flush_interval`. Returns the total bytes read from this pipe.
pub async fn drain<R>(
    mut reader: R,
    execution_id: ExecutionId,
    stream: StreamKind,
    outbound: Arc<OutboundQueue>,
    ring: Arc<Mutex<OutputRing>>,
    handles: PumpHandles,
    config: PumpConfig,
) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; config.read_chunk];
    let mut pending: Vec<u8> = Vec::new();
    let mut sequence: u64 = 0;
    let mut last_flush = tokio::time::Instant::now();
    let mut total: u64 = 0;

    loop {
        let read_fut = reader.read(&mut buf);
        let flush_due_in = if pending.is_empty() {
            None
        } else {
            Some(config.flush_interval.saturating_sub(last_flush.elapsed()))
        };

        tokio::select! {
            biased;

            res = read_fut => {
                match res {
                    Ok(0) => {
                        if !pending.is_empty() {
                            let line = std::mem::take(&mut pending);
                            emit(&outbound, &ring, &handles, execution_id, stream, &mut sequence, line, config.binary_threshold).await;
                        }
                        break;
                    }
                    Ok(n) => {
                        total += n as u64;
                        pending.extend_from_slice(&buf[..n]);
                        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = pending.drain(..=pos).collect();
                            emit(&outbound, &ring, &handles, execution_id, stream, &mut sequence, line, config.binary_threshold).await;
                            last_flush = tokio::time::Instant::now();
                        }
                        if !pending.is_empty() && last_flush.elapsed() >= config.flush_interval {
                            let line = std::mem::take(&mut pending);
                            emit(&outbound, &ring, &handles, execution_id, stream, &mut sequence, line, config.binary_threshold).await;
                            last_flush = tokio::time::Instant::now();
                        }
                    }
                    Err(e) => {
                        warn!(?stream, error = %e, "stream pump read error, treating as EOF");
                        if !pending.is_empty() {
                            let line = std::mem::take(&mut pending);
                            emit(&outbound, &ring, &handles, execution_id, stream, &mut sequence, line, config.binary_threshold).await;
                        }
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(flush_due_in.unwrap_or(Duration::from_secs(3600))), if flush_due_in.is_some() => {
                let line = std::mem::take(&mut pending);
                emit(&outbound, &ring, &handles, execution_id, stream, &mut sequence, line, config.binary_threshold).await;
                last_flush = tokio::time::Instant::now();
            }
        }
    }

    debug!(?stream, total_bytes = total, "stream pump drain reached EOF");
    total
}

/// Push one chunk to both the outbound queue (the live stream) and the
/// session's replay ring (spec §3's `OutputChunk`, `gwd-session::ring`'s
/// replay buffer) — the ring is a passive mirror of exactly what went out,
/// never a second source of truth.
async fn emit(
    outbound: &OutboundQueue,
    ring: &Mutex<OutputRing>,
    handles: &PumpHandles,
    execution_id: ExecutionId,
    stream: StreamKind,
    sequence: &mut u64,
    payload: Vec<u8>,
    binary_threshold: usize,
) {
    if payload.is_empty() {
        return;
    }
    let (payload, redacted) = redact_if_binary(payload, binary_threshold);
    let seq = *sequence;
    *sequence += 1;

    handles.counter_for(stream).fetch_add(payload.len() as u64, Ordering::Relaxed);
    handles.last_output_at_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);

    let chunk = OutputChunk {
        execution_id,
        stream,
        sequence: seq,
        payload,
        emitted_at: Utc::now(),
        truncated: redacted,
    };

    ring.lock().await.push(chunk.clone());
    outbound.push(Notification::Output(chunk), Duration::from_secs(1)).await;
}

/// Run both drains concurrently to completion. Resolves once both pipes
/// have reported EOF — the "pump-closed" signal of spec §4.7, at which
/// point the Supervisor calls `ProcessHandle::wait()`.
pub async fn run_pump<O, E>(
    stdout: O,
    stderr: E,
    execution_id: ExecutionId,
    outbound: Arc<OutboundQueue>,
    ring: Arc<Mutex<OutputRing>>,
    handles: PumpHandles,
    config: PumpConfig,
) where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let stdout_outbound = Arc::clone(&outbound);
    let stdout_ring = Arc::clone(&ring);
    let stdout_handles = handles.clone();
    let stdout_task = tokio::spawn(drain(
        stdout,
        execution_id,
        StreamKind::Stdout,
        stdout_outbound,
        stdout_ring,
        stdout_handles,
        config,
    ));

    let stderr_task = tokio::spawn(drain(
        stderr,
        execution_id,
        StreamKind::Stderr,
        outbound,
        ring,
        handles,
        config,
    ));

    let _ = tokio::join!(stdout_task, stderr_task);
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwd_core::new_execution_id;
    use std::io::Cursor;

    async fn collect_output(queue: &OutboundQueue) -> Vec<OutputChunk> {
        let mut chunks = Vec::new();
        while let Ok(Some(n)) = tokio::time::timeout(Duration::from_millis(100), queue.recv()).await {
            if let Notification::Output(c) = n {
                chunks.push(c);
            }
        }
        chunks
    }

    fn new_ring() -> Arc<Mutex<OutputRing>> {
        Arc::new(Mutex::new(OutputRing::new(1024 * 1024)))
    }

    #[tokio::test]
    async fn emits_gap_free_sequence_per_stream() {
        let queue = Arc::new(OutboundQueue::new(1024 * 1024));
        let execution_id = new_execution_id();
        let reader = Cursor::new(b"line one\nline two\nline three\n".to_vec());
        drain(
            reader,
            execution_id,
            StreamKind::Stdout,
            Arc::clone(&queue),
            new_ring(),
            PumpHandles::new(),
            PumpConfig::default(),
        )
        .await;
        queue.close();

        let chunks = collect_output(&queue).await;
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i as u64);
        }
    }

    #[tokio::test]
    async fn partial_line_is_flushed_without_a_trailing_newline() {
        let queue = Arc::new(OutboundQueue::new(1024 * 1024));
        let execution_id = new_execution_id();
        let reader = Cursor::new(b"no newline at all".to_vec());
        drain(
            reader,
            execution_id,
            StreamKind::Stdout,
            Arc::clone(&queue),
            new_ring(),
            PumpHandles::new(),
            PumpConfig::default(),
        )
        .await;
        queue.close();

        let chunks = collect_output(&queue).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].payload, b"no newline at all");
    }

    #[tokio::test]
    async fn last_output_at_advances_as_chunks_arrive() {
        let queue = Arc::new(OutboundQueue::new(1024 * 1024));
        let execution_id = new_execution_id();
        let handles = PumpHandles::new();
        let before = handles.last_output_at_ms.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let reader = Cursor::new(b"hello\n".to_vec());
        drain(
            reader,
            execution_id,
            StreamKind::Stdout,
            queue,
            new_ring(),
            handles.clone(),
            PumpConfig::default(),
        )
        .await;
        assert!(handles.last_output_at_ms.load(Ordering::Relaxed) >= before);
        assert_eq!(handles.bytes_out.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn run_pump_drains_both_streams() {
        let queue = Arc::new(OutboundQueue::new(1024 * 1024));
        let execution_id = new_execution_id();
        let stdout = Cursor::new(b"out line\n".to_vec());
        let stderr = Cursor::new(b"err line\n".to_vec());
        run_pump(
            stdout,
            stderr,
            execution_id,
            Arc::clone(&queue),
            new_ring(),
            PumpHandles::new(),
            PumpConfig::default(),
        )
        .await;
        queue.close();
        let chunks = collect_output(&queue).await;
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn drain_mirrors_every_chunk_into_the_ring() {
        let queue = Arc::new(OutboundQueue::new(1024 * 1024));
        let ring = new_ring();
        let execution_id = new_execution_id();
        let reader = Cursor::new(b"line one\nline two\n".to_vec());
        drain(
            reader,
            execution_id,
            StreamKind::Stdout,
            Arc::clone(&queue),
            Arc::clone(&ring),
            PumpHandles::new(),
            PumpConfig::default(),
        )
        .await;
        queue.close();

        let snapshot = ring.lock().await.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].payload, b"line one\n");
        assert_eq!(snapshot[1].payload, b"line two\n");
    }
}
