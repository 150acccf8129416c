//! Caching, translating reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ─▶ firewall ─▶ purge ─▶ cache lookup ─▶ forwarder ─▶ Upstream
//!                         │                                  │               │
//!     Client Response     │                                  ▼               ▼
//!     ◀───────────────────┴──────────────────────── response dispatcher ◀── translation
//!
//!     Cross-cutting: config, observability, lifecycle, KeyValueStore
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use translating_proxy::config::loader::load_config;
use translating_proxy::lifecycle::signals::spawn_signal_handler;
use translating_proxy::observability::{logging, metrics};
use translating_proxy::{HttpServer, ProxyConfig};

#[derive(Parser)]
#[command(name = "translating-proxy")]
#[command(about = "Caching, translating reverse proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "translating-proxy starting");
    if args.config.is_none() {
        tracing::warn!("No --config given, running with defaults (no proxied hosts)");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        https = config.listener.tls.is_some(),
        proxied_hosts = ?config.upstream.proxied_hosts,
        cache_enabled = config.cache.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    spawn_signal_handler(server.shutdown_handle());
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
