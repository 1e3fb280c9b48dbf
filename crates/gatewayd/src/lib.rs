pub mod cli;
pub mod doctor;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Router;
use gwd_config::GatewayConfig;
use gwd_history::build_history_store;
use gwd_hooks::{HookDispatcher, HooksFile};
use gwd_rpc::health;
use gwd_supervisor::Supervisor;

/// Build version string combining Cargo.toml version and the git-describe
/// value baked in at build time (see `build.rs`).
pub fn version_string() -> &'static str {
    static VERSION: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION.get_or_init(|| {
        let cargo_ver = env!("CARGO_PKG_VERSION");
        let git_desc = env!("GWD_GIT_DESCRIBE");
        if git_desc.is_empty() {
            cargo_ver.to_string()
        } else {
            format!("{cargo_ver} ({git_desc})")
        }
    })
}

async fn load_hooks(config: &GatewayConfig) -> Result<Arc<HookDispatcher>> {
    match &config.hooks_config {
        Some(path) => {
            let file = HooksFile::load(path)
                .await
                .with_context(|| format!("failed to load hooks config at {}", path.display()))?;
            Ok(Arc::new(HookDispatcher::new(file.hooks)))
        }
        None => Ok(Arc::new(HookDispatcher::empty())),
    }
}

/// Wire up a Supervisor and its `/ws` + `/health` + `/version` router. Split
/// out from `main` so integration tests can drive a real listener without
/// going through the CLI or `tokio::signal`.
pub async fn build_app(config: Arc<GatewayConfig>) -> Result<(Router, Arc<Supervisor>)> {
    let history = build_history_store(&config).await;
    let hooks = load_hooks(&config).await?;
    let supervisor = Arc::new(Supervisor::new(Arc::clone(&config), history, hooks));

    let app = gwd_rpc::router(Arc::clone(&supervisor))
        .merge(health::router(Arc::clone(&supervisor), Instant::now(), version_string()));

    Ok((app, supervisor))
}
