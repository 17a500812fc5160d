//! B1BOT entry point.
//!
//! Loads configuration, initialises structured logging, connects to the
//! exchange (retrying until it answers), starts the engine and the status
//! server, and shuts down cleanly on Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use b1bot::config::{self, AppConfig, LoggingConfig};
use b1bot::dashboard;
use b1bot::dashboard::routes::DashboardState;
use b1bot::engine::Engine;
use b1bot::exchange::bigone::BigOneClient;
use b1bot::exchange::ExchangeApi;

const BANNER: &str = r#"
 ____  _   ____   ___ _____
| __ )/ | | __ ) / _ \_   _|
|  _ \| | |  _ \| | | || |
| |_) | | | |_) | |_| || |
|____/|_| |____/ \___/ |_|

  Inventory-balancing volume trader for BigONE
  v0.1.0
"#;

#[derive(Parser, Debug)]
#[command(author, version, about = "BigONE volume-mining bot")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    init_logging(&cfg.logging)?;

    println!("{BANNER}");
    info!(
        config = %cli.config,
        endpoint = %cfg.exchange.endpoint,
        pair = %cfg.exchange.symbol_pair,
        trade_amount = cfg.trading.exchange_amount,
        "B1BOT starting up"
    );

    let credentials = cfg.exchange.credentials()?;
    let api: Arc<dyn ExchangeApi> = Arc::new(BigOneClient::new(
        &cfg.exchange.endpoint,
        credentials,
        cfg.exchange.request_timeout(),
    )?);

    // -- Connect, retrying while the exchange is unreachable --------------

    let retry_wait = Duration::from_millis(cfg.exchange.create_client_wait_ms);
    let engine = loop {
        match Engine::connect(cfg.clone(), Arc::clone(&api)).await {
            Ok(engine) => break engine,
            Err(e) if e.is_retryable() => {
                warn!(
                    error = %e,
                    retry_in_ms = retry_wait.as_millis() as u64,
                    "Exchange not ready, retrying"
                );
                tokio::time::sleep(retry_wait).await;
            }
            Err(e) => {
                error!(error = %e, "Startup failed");
                return Err(e.into());
            }
        }
    };

    let running = engine.start();

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::from_engine(&running));
        dashboard::spawn_dashboard(state, cfg.dashboard.port);
    }

    info!("Running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Ctrl+C received, shutting down");
    running.shutdown().await;
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level applies to this crate.
/// `B1BOT_LOG_JSON` or `logging.json` selects JSON output, and
/// `logging.file` tees every line into a file.
fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let level = config::normalize_log_level(&cfg.level)?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("b1bot={level}")));

    let json_logging = cfg.json || std::env::var("B1BOT_LOG_JSON").is_ok();

    let file = match &cfg.file {
        Some(path) => {
            let path = std::path::Path::new(path);
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(Arc::new(file))
        }
        None => None,
    };

    match (json_logging, file) {
        (true, Some(file)) => fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr.and(file))
            .init(),
        (true, None) => fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init(),
        (false, Some(file)) => fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(std::io::stderr.and(file))
            .init(),
        (false, None) => fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
    }

    Ok(())
}
