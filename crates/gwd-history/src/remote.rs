use async_trait::async_trait;
use gwd_core::{Category, HistoryRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{HistoryEntry, HistoryStore, Outcome};

/// History backed by a remote KV service reachable over HTTP. Per the
/// resolved Open Question (spec §9): when both a local and a remote backend
/// are configured, the remote one is authoritative, so `gwd-config` only
/// ever selects one active `HistoryStore` at a time rather than layering
/// them — this is that store.
///
/// Every call degrades to the store's no-op contract on any network error:
/// `get -> None`, `record` drops the write, `list_recent -> []`.
pub struct RemoteHistoryStore {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize, Deserialize)]
struct RecordPayload {
    category: Category,
    fingerprint: u64,
    duration_ms: u64,
    timed_out: bool,
}

impl RemoteHistoryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(50))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl HistoryStore for RemoteHistoryStore {
    async fn get(&self, fingerprint: u64) -> Option<HistoryEntry> {
        let url = format!("{}/history/{fingerprint}", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.json::<HistoryEntry>().await.ok(),
            Ok(resp) => {
                warn!(status = %resp.status(), "remote history GET returned non-success");
                None
            }
            Err(e) => {
                warn!(error = %e, "remote history GET failed, degrading to None");
                None
            }
        }
    }

    async fn record(&self, category: Category, fingerprint: u64, duration_ms: u64, outcome: Outcome) {
        let payload = RecordPayload {
            category,
            fingerprint,
            duration_ms,
            timed_out: outcome == Outcome::TimedOut,
        };
        let url = format!("{}/history", self.base_url);
        if let Err(e) = self.client.post(&url).json(&payload).send().await {
            warn!(error = %e, "remote history POST failed, dropping record");
        }
    }

    async fn list_recent(&self, category: Category, limit: usize) -> Vec<HistoryRecord> {
        let url = format!("{}/history/recent", self.base_url);
        match self
            .client
            .get(&url)
            .query(&[("category", format!("{category:?}")), ("limit", limit.to_string())])
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<Vec<HistoryRecord>>().await.unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}
