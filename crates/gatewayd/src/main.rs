use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use gatewayd::cli::{Cli, Commands};
use gatewayd::doctor;
use gwd_config::GatewayConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let mut config = GatewayConfig::from_env();

    match cli.command {
        Commands::Doctor => {
            doctor::run(&config).await;
            Ok(())
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let config = Arc::new(config);
    let (app, supervisor) = gatewayd::build_app(Arc::clone(&config)).await?;

    let housekeeping_supervisor = Arc::clone(&supervisor);
    let housekeeping = tokio::spawn(async move {
        housekeeping_supervisor.run_housekeeping().await;
    });

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind gatewayd listener at {bind_addr}"))?;
    info!(addr = %bind_addr, "gatewayd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gatewayd server stopped with an error")?;

    housekeeping.abort();
    supervisor.shutdown().await;
    info!("gatewayd shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
