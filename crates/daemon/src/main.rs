//! BDTP Daemon - Transfer-gated workflow service
//!
//! The daemon provides:
//! - REST API for opening, inspecting, and cancelling workflow sessions
//! - Listing management for the purchase catalog
//! - Local ledger simulation for development wiring

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bdtp_daemon::config::DaemonConfig;
use bdtp_daemon::error::{DaemonError, DaemonResult};
use bdtp_daemon::server::Server;

/// BDTP Daemon CLI
#[derive(Parser)]
#[command(name = "bdtpd")]
#[command(about = "BDTP Daemon - Transfer-gated workflow service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BDTP_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(
        short,
        long,
        env = "BDTP_LISTEN_ADDR",
        default_value = "127.0.0.1:8080"
    )]
    listen: String,

    /// Log level
    #[arg(long, env = "BDTP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "BDTP_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    config.server.listen_addr = cli
        .listen
        .parse()
        .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        treasury = %config.engine.treasury_address,
        "starting BDTP daemon"
    );

    let server = Server::new(config)?;
    server.run().await
}
