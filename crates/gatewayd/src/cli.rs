use clap::{Parser, Subcommand};

/// Build version string combining Cargo.toml version and git describe.
fn build_version() -> &'static str {
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

#[derive(Parser)]
#[command(name = "gatewayd", version = build_version())]
#[command(about = "Remote command-execution gateway daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway: JSON-RPC WebSocket endpoint plus health side-channel.
    Serve {
        /// Override the listen port (defaults to `PORT` env var, then 8003).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check environment and configuration without starting the gateway.
    Doctor,
}
