//! PriceWatch - oracle price comparison monitor
//!
//! Loads configuration, wires the Hermes client to the console/CSV sinks and
//! runs the polling loop until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pricewatch::config::{AppConfig, LoggingConfig};
use pricewatch::monitor::PriceMonitor;
use pricewatch::oracle::sources::HermesClient;
use pricewatch::persistence::CsvPersistence;
use pricewatch::sink::{ConsoleSink, CsvSink, MultiSink, ResultSink};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    info!("PriceWatch v{} starting", env!("CARGO_PKG_VERSION"));
    info!(config = %config, "Configuration loaded");

    let registry = match config.validate() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let fetcher = Arc::new(HermesClient::new(
        &config.oracle.base_url,
        config.oracle.api_flavor,
        config.oracle_timeout(),
    )?);
    info!(endpoint = %fetcher.endpoint(), "Oracle client ready");

    let mut sink = MultiSink::new().with(Arc::new(ConsoleSink::new()));
    if config.persistence.csv_enabled {
        let persistence = CsvPersistence::new(&config.persistence.data_dir)
            .context("Failed to initialize CSV persistence")?;
        info!(data_dir = %persistence.data_dir().display(), "CSV persistence enabled");
        sink = sink.with(Arc::new(CsvSink::new(Arc::new(persistence))));
    }
    let sink: Arc<dyn ResultSink> = Arc::new(sink);

    let mut monitor = PriceMonitor::new(config.monitor_config(), registry, fetcher, sink);

    if config.monitor.run_once {
        monitor.run_cycle().await;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would stop the loop
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    monitor.run(shutdown_rx).await;
    Ok(())
}

/// RUST_LOG wins over the configured level; logs go to stderr so stdout
/// carries only console output
fn init_logging(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
