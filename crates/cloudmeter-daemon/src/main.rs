//! Cloudmeter Daemon - Main entry point
//!
//! Polls the cloud API for device metadata and meter readings and serves
//! them as gauges for Prometheus to scrape.

mod config;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use cloudmeter_core::{GaugeRegistry, JsonFileStore, MetadataCache};
use cloudmeter_sync::{CloudClient, Pacer, Poller, ReqwestTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "cloudmeter")]
#[command(about = "Cloud power metrics exporter")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cloudmeter.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Discard the cached device/room snapshot before starting
    #[arg(long)]
    clean_cache: bool,

    /// Run a single refresh and collection pass, print the metrics and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Cloudmeter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;

    info!(
        server = %ReqwestTransport::normalize_server(&config.cloud.server),
        interval_secs = config.cloud.poll_interval_secs,
        listen = %config.listen_addr(),
        "Configuration loaded"
    );

    let cache = MetadataCache::new(Arc::new(JsonFileStore::new(&config.cache.dir)));
    if args.clean_cache {
        match cache.clear() {
            Ok(()) => info!(dir = %config.cache.dir, "Cleared cloud cache"),
            Err(e) => warn!(error = %e, "Failed to clear cloud cache"),
        }
    }

    let transport = ReqwestTransport::new(&config.cloud.server, config.request_timeout())
        .context("Failed to create HTTP client")?;
    let client = Arc::new(
        CloudClient::new(
            Arc::new(transport),
            Arc::new(Pacer::new(config.request_spacing())),
            config.cloud.auth_key.clone(),
        )
        .with_max_retries(config.cloud.max_retries),
    );

    let registry = Arc::new(GaugeRegistry::new(config.metrics.namespace.clone()));
    let shutdown = CancellationToken::new();
    let mut poller = Poller::new(
        client,
        cache,
        registry.clone(),
        config.to_poller_config(),
        &shutdown,
    );

    if args.once {
        // Single pass mode
        poller.load_cache();
        let report = poller.refresh().await;
        info!(
            devices = report.devices,
            written = report.written,
            "Single collection pass finished"
        );
        print!("{}", registry.render());
        return Ok(());
    }

    // The process is useless without its listener
    let listener = match server::bind(&config.listen_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %config.listen_addr(), error = %e, "Starting the metrics server failed");
            return Err(e);
        }
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let poller_task = tokio::spawn(poller.run());

    let served = server::serve(listener, registry, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = poller_task.await {
        error!(error = %e, "Cloud poller task failed");
    }

    served
}
