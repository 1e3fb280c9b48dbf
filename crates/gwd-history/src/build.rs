use std::sync::Arc;

use gwd_config::GatewayConfig;
use tracing::info;

use crate::remote::RemoteHistoryStore;
use crate::store::{FileHistoryStore, HistoryStore, NullHistoryStore};

/// Select the single active history backend from configuration. Per the
/// resolved Open Question (spec §9), remote is authoritative when both a
/// local and a remote backend would otherwise apply, so this never layers
/// two stores — it picks exactly one.
pub async fn build_history_store(config: &GatewayConfig) -> Arc<dyn HistoryStore> {
    match config.history_backend_url.as_deref() {
        Some(url) if url.starts_with("file://") => {
            let path = url.trim_start_matches("file://");
            info!(path, "history: using file-backed store");
            Arc::new(FileHistoryStore::load(path).await)
        }
        Some(url) => {
            info!(url, "history: using remote store (authoritative per configuration)");
            Arc::new(RemoteHistoryStore::new(url))
        }
        None => {
            info!("history: no backend configured, history disabled");
            Arc::new(NullHistoryStore)
        }
    }
}
