//! Read-only environment diagnostics, the `gatewayd` analogue of
//! `cli-sub-agent::doctor`: report what the daemon would see at start-up
//! without actually binding a listener or spawning anything.

use std::env;
use std::time::Duration;

use gwd_config::GatewayConfig;
use gwd_hooks::HooksFile;
use gwd_resource::ResourceMonitor;

pub async fn run(config: &GatewayConfig) {
    println!("=== gatewayd Environment Check ===");
    print_platform_info();
    println!();

    println!("=== Configuration ===");
    print_config(config);
    println!();

    println!("=== History Backend ===");
    print_history_status(config).await;
    println!();

    println!("=== Hooks Config ===");
    print_hooks_status(config).await;
    println!();

    println!("=== Resource Status ===");
    print_resource_status().await;
}

fn print_platform_info() {
    let os = env::consts::OS;
    let arch = env::consts::ARCH;
    println!("Platform: {os} {arch}");
    println!("Version:  {}", env!("CARGO_PKG_VERSION"));
}

fn print_config(config: &GatewayConfig) {
    println!("Port:               {}", config.port);
    println!("Max sessions:       {}", config.max_sessions);
    println!("Session idle (s):   {}", config.session_idle_secs);
    println!("Stream timeout (s): {}", config.stream_timeout_secs);
    println!("Cleanup timeout(s): {}", config.cleanup_timeout_secs);
    println!("Max backlog bytes:  {}", config.max_session_backlog_bytes);
    println!("Log level:          {}", config.log_level);
    match &config.history_backend_url {
        Some(url) => println!("History backend:    {url}"),
        None => println!("History backend:    (none — history disabled)"),
    }
    match &config.hooks_config {
        Some(path) => println!("Hooks config:       {}", path.display()),
        None => println!("Hooks config:       (none configured)"),
    }
}

async fn print_history_status(config: &GatewayConfig) {
    match config.history_backend_url.as_deref() {
        None => println!("no backend configured, history is disabled"),
        Some(url) if url.starts_with("file://") => {
            let path = url.trim_start_matches("file://");
            match tokio::fs::metadata(path).await {
                Ok(_) => println!("file-backed store at {path}: reachable"),
                Err(_) => println!("file-backed store at {path}: not yet created (will be created on first write)"),
            }
        }
        Some(url) => println!("remote store at {url}: reachability not probed (checked lazily on first record)"),
    }
}

async fn print_hooks_status(config: &GatewayConfig) {
    match &config.hooks_config {
        None => println!("no HOOKS_CONFIG set, running with no hooks"),
        Some(path) => match HooksFile::load(path).await {
            Ok(file) => println!("{}: {} hook(s) loaded", path.display(), file.hooks.len()),
            Err(e) => println!("{}: invalid ({e})", path.display()),
        },
    }
}

async fn print_resource_status() {
    let monitor = ResourceMonitor::start();
    // Give the sampling task one tick to produce its first reading.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let load = monitor.current_load();
    println!("CPU:        {:.1}%", load.cpu_pct);
    println!("Memory:     {:.1}%", load.mem_pct);
    println!("Multiplier: {:.1}x", load.multiplier);
}
