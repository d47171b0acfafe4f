//! udp-request-log
//!
//! A multi-worker HTTP server that reports every completed request to a UDP
//! collector as one datagram: `METHOD PATH (0xCRC32)\n`.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌──────────────────────────────────────────────────┐
//!                │  control thread                                  │
//!                │  config → RouteTable ──watch──┐   signals/reload │
//!                └───────────────────────────────┼──────────────────┘
//!                                                ▼
//!   Client ──TCP──▶ worker-N runtime: axum Router → location response
//!                                     │
//!                                     └─ request completed
//!                                          ├─ RequestLogger ──UDP──▶ collector
//!                                          ├─ access log (tracing)
//!                                          └─ metrics
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;

use udp_request_log::config::load_config;
use udp_request_log::config::watcher::ConfigWatcher;
use udp_request_log::http::{HttpServer, RouteTable};
use udp_request_log::lifecycle::{Reloader, Shutdown, Signal, SignalListener};
use udp_request_log::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "udp-request-log", version, about = "HTTP server with UDP request logging")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "udp-request-log.toml")]
    config: PathBuf,

    /// Load, validate and resolve the configuration, then exit
    #[arg(long)]
    check: bool,

    /// Override the number of worker threads
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    workers: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(workers) = cli.workers {
        config.workers = usize::from(workers);
    }
    let routes = RouteTable::compile(&config)?;

    if cli.check {
        println!("configuration file {} test is successful", cli.config.display());
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("udp-request-log v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %cli.config.display(),
        servers = config.servers.len(),
        workers = config.workers,
        udp_logging = %routes.global_scope().destination(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (routes_tx, routes_rx) = watch::channel(Arc::new(routes));
    let shutdown = Shutdown::new();
    let running = HttpServer::new(config.clone(), routes_rx).start(&shutdown)?;
    let reloader = Arc::new(
        Reloader::new(&cli.config, &config, routes_tx)
            .with_workers_override(cli.workers.map(usize::from)),
    );

    let _watcher = if config.watch {
        Some(ConfigWatcher::new(&cli.config, Arc::clone(&reloader)).run()?)
    } else {
        None
    };

    let mut signals = SignalListener::new()?;
    while let Signal::Reload = signals.recv().await {
        if let Err(e) = reloader.reload_from_disk() {
            tracing::error!(error = %e, "Reload failed. Keeping current configuration.");
        }
    }

    tracing::info!("Shutdown signal received");
    shutdown.trigger();
    tokio::task::spawn_blocking(move || running.join()).await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
