//! The optional capped ring buffer (spec §3, §1 Non-goals: "No persistence
//! of stdout beyond the live stream and an optional capped ring buffer").
//! Lets a client that (re)attaches mid-execution replay recent output
//! instead of only ever seeing what arrives after it subscribes. Populated
//! by `gwd-stream::pump::emit` alongside every `output` notification it
//! pushes to the session's outbound queue; cleared at the start of each new
//! execution (`SessionHandle::try_begin_execution`) so replay never serves
//! a previous execution's stale output.

use std::collections::VecDeque;

use gwd_core::OutputChunk;

pub struct OutputRing {
    chunks: VecDeque<OutputChunk>,
    bytes: usize,
    max_bytes: usize,
}

impl OutputRing {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            bytes: 0,
            max_bytes,
        }
    }

    /// Append a chunk, evicting the oldest entries if the cap is exceeded.
    pub fn push(&mut self, chunk: OutputChunk) {
        self.bytes += chunk.payload.len();
        self.chunks.push_back(chunk);
        while self.bytes > self.max_bytes {
            match self.chunks.pop_front() {
                Some(old) => self.bytes = self.bytes.saturating_sub(old.payload.len()),
                None => break,
            }
        }
    }

    pub fn snapshot(&self) -> Vec<OutputChunk> {
        self.chunks.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
