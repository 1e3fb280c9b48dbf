use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gwd_core::{Category, HistoryRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::percentile::percentile;

/// Result of `get`: the percentile summary an estimator needs, without
/// exposing the raw sample ring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub n: usize,
}

/// Outcome of a completed execution, used to decide whether a duration
/// counts toward the percentile samples or the separate `timeouts` counter
/// (spec §4.2: "implementations MUST ignore durations from executions that
/// were killed for timeout when updating percentiles").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    TimedOut,
}

/// Contract from spec §4.2. `get` must never block more than 50ms; `record`
/// is best-effort. Implementations backed by an unavailable store degrade
/// silently: `get` returns `None`, `record` is a no-op.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get(&self, fingerprint: u64) -> Option<HistoryEntry>;
    async fn record(&self, category: Category, fingerprint: u64, duration_ms: u64, outcome: Outcome);
    async fn list_recent(&self, category: Category, limit: usize) -> Vec<HistoryRecord>;
}

#[derive(Serialize, Deserialize)]
struct Entry {
    record: HistoryRecord,
    category: Category,
}

/// In-process history, keyed by fingerprint. The default backend; used
/// standalone or as the persistence layer behind [`FileHistoryStore`].
#[derive(Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<HashMap<u64, Entry>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn snapshot(&self) -> HashMap<u64, Entry> {
        self.entries.read().await.iter().map(|(k, v)| (*k, Entry { record: v.record.clone(), category: v.category })).collect()
    }

    fn restore(entries: HashMap<u64, Entry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get(&self, fingerprint: u64) -> Option<HistoryEntry> {
        let table = self.entries.read().await;
        table.get(&fingerprint).map(|e| HistoryEntry {
            p50_ms: e.record.p50_ms,
            p90_ms: e.record.p90_ms,
            n: e.record.samples_ms.len(),
        })
    }

    async fn record(&self, category: Category, fingerprint: u64, duration_ms: u64, outcome: Outcome) {
        let mut table = self.entries.write().await;
        let entry = table.entry(fingerprint).or_insert_with(|| Entry {
            record: HistoryRecord::new(fingerprint),
            category,
        });

        if outcome == Outcome::TimedOut {
            entry.record.timeouts += 1;
            entry.record.updated_at = Utc::now();
            return;
        }

        entry.record.samples_ms.push_back(duration_ms);
        while entry.record.samples_ms.len() > HistoryRecord::MAX_SAMPLES {
            entry.record.samples_ms.pop_front();
        }

        let mut sorted: Vec<u64> = entry.record.samples_ms.iter().copied().collect();
        sorted.sort_unstable();
        entry.record.p50_ms = percentile(&sorted, 0.5);
        entry.record.p90_ms = percentile(&sorted, 0.9);
        entry.record.updated_at = Utc::now();
    }

    async fn list_recent(&self, category: Category, limit: usize) -> Vec<HistoryRecord> {
        let table = self.entries.read().await;
        let mut matches: Vec<HistoryRecord> = table
            .values()
            .filter(|e| e.category == category)
            .map(|e| e.record.clone())
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matches.truncate(limit);
        matches
    }
}

/// File-backed history store: an [`InMemoryHistoryStore`] that loads its
/// table from a TOML snapshot at start-up and persists after every write,
/// the same `load`/`save` shape as `csa-resource::stats::UsageStats`.
pub struct FileHistoryStore {
    inner: InMemoryHistoryStore,
    path: PathBuf,
}

#[derive(Default, Serialize, Deserialize)]
struct OnDisk {
    entries: HashMap<u64, Entry>,
}

impl FileHistoryStore {
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match toml::from_str::<OnDisk>(&content) {
                Ok(on_disk) => on_disk.entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "history file corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            inner: InMemoryHistoryStore::restore(entries),
            path,
        }
    }

    async fn persist(&self) {
        let entries = self.inner.snapshot().await;
        let on_disk = OnDisk { entries };
        match toml::to_string_pretty(&on_disk) {
            Ok(content) => {
                if let Err(e) = tokio::fs::write(&self.path, content).await {
                    warn!(path = %self.path.display(), error = %e, "failed to persist history");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize history"),
        }
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn get(&self, fingerprint: u64) -> Option<HistoryEntry> {
        self.inner.get(fingerprint).await
    }

    async fn record(&self, category: Category, fingerprint: u64, duration_ms: u64, outcome: Outcome) {
        self.inner.record(category, fingerprint, duration_ms, outcome).await;
        self.persist().await;
    }

    async fn list_recent(&self, category: Category, limit: usize) -> Vec<HistoryRecord> {
        self.inner.list_recent(category, limit).await
    }
}

/// A store that degrades every call to a no-op. Used when no backend is
/// configured (spec §4.2: "Optional; degrades to defaults if unavailable").
pub struct NullHistoryStore;

#[async_trait]
impl HistoryStore for NullHistoryStore {
    async fn get(&self, _fingerprint: u64) -> Option<HistoryEntry> {
        None
    }

    async fn record(&self, _category: Category, _fingerprint: u64, _duration_ms: u64, _outcome: Outcome) {}

    async fn list_recent(&self, _category: Category, _limit: usize) -> Vec<HistoryRecord> {
        Vec::new()
    }
}

pub type SharedHistoryStore = Arc<dyn HistoryStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_fingerprint_returns_none() {
        let store = InMemoryHistoryStore::new();
        assert!(store.get(42).await.is_none());
    }

    #[tokio::test]
    async fn percentiles_update_after_three_samples() {
        let store = InMemoryHistoryStore::new();
        for d in [100, 200, 300] {
            store.record(Category::Code, 7, d, Outcome::Completed).await;
        }
        let entry = store.get(7).await.expect("entry should exist");
        assert_eq!(entry.n, 3);
        assert_eq!(entry.p50_ms, 200);
        assert_eq!(entry.p90_ms, 300);
    }

    #[tokio::test]
    async fn timeouts_are_tracked_separately_from_percentiles() {
        let store = InMemoryHistoryStore::new();
        store.record(Category::Code, 7, 100, Outcome::Completed).await;
        store.record(Category::Code, 7, 99_999, Outcome::TimedOut).await;
        let entry = store.get(7).await.unwrap();
        assert_eq!(entry.n, 1, "timed-out duration must not enter the sample ring");
        assert_eq!(entry.p90_ms, 100);
    }

    #[tokio::test]
    async fn sample_ring_caps_at_twenty() {
        let store = InMemoryHistoryStore::new();
        for d in 1..=25u64 {
            store.record(Category::Code, 1, d, Outcome::Completed).await;
        }
        let entry = store.get(1).await.unwrap();
        assert_eq!(entry.n, 20);
    }

    #[tokio::test]
    async fn list_recent_filters_by_category() {
        let store = InMemoryHistoryStore::new();
        store.record(Category::Code, 1, 100, Outcome::Completed).await;
        store.record(Category::Data, 2, 100, Outcome::Completed).await;
        let recent = store.list_recent(Category::Code, 10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].fingerprint, 1);
    }

    #[tokio::test]
    async fn null_store_always_degrades_quietly() {
        let store = NullHistoryStore;
        store.record(Category::Code, 1, 100, Outcome::Completed).await;
        assert!(store.get(1).await.is_none());
        assert!(store.list_recent(Category::Code, 10).await.is_empty());
    }

    #[tokio::test]
    async fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.toml");

        {
            let store = FileHistoryStore::load(&path).await;
            store.record(Category::Code, 9, 500, Outcome::Completed).await;
        }

        let reloaded = FileHistoryStore::load(&path).await;
        let entry = reloaded.get(9).await.expect("should survive reload");
        assert_eq!(entry.n, 1);
        assert_eq!(entry.p50_ms, 500);
    }
}
