//! Boots the real router against a real TCP listener, the same
//! black-box shape as `csa-mcp-hub::serve`'s connection tests, and checks
//! the ambient `/health` and `/version` side-channel end to end.

use std::sync::Arc;

use gwd_config::GatewayConfig;

async fn spawn_gateway() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let config = Arc::new(GatewayConfig {
        port: 0,
        ..GatewayConfig::default()
    });
    let (app, _supervisor) = gatewayd::build_app(config).await.expect("build_app");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (addr, handle)
}

#[tokio::test]
async fn health_endpoint_reports_zero_sessions_on_a_fresh_gateway() {
    let (addr, _server) = spawn_gateway().await;

    let response = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("GET /health");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn version_endpoint_reports_the_crate_version() {
    let (addr, _server) = spawn_gateway().await;

    let response = reqwest::get(format!("http://{addr}/version"))
        .await
        .expect("GET /version");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("json body");
    assert!(body["version"].as_str().unwrap().starts_with(env!("CARGO_PKG_VERSION")));
}
