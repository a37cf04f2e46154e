//! backstop service entry point.
//!
//! Loads configuration, initializes logging and metrics, then serves the
//! guarded HTTP surface until a shutdown signal arrives.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use backstop::config::{load_config, AppConfig};
use backstop::http::HttpServer;
use backstop::observability;

#[derive(Debug, Parser)]
#[command(name = "backstop", about = "Resilience guards for HTTP services")]
struct Args {
    /// Path to a TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    observability::logging::init(&config.observability.log_level);

    tracing::info!("backstop v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_failures = config.circuit_breaker.max_failures,
        reset_timeout_secs = config.circuit_breaker.reset_timeout_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        rate_limit_burst = config.rate_limit.burst,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let server = HttpServer::new(config);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
