use anyhow::{Context, Result};
use clap::Parser;
use rollcall::clock::SystemClock;
use rollcall::config::{AppConfig, ConfigLoader, StoreBackend};
use rollcall::observability::{PollMetrics, init_tracing};
use rollcall::scanner::create_scanner;
use rollcall::services::PollLoop;
use rollcall::storage::StorageFactory;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "rollcall", author, version, about = "Bluetooth proximity class attendance", long_about = None)]
struct Cli {
    /// Config file path (defaults to ./rollcall.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Use the in-process store instead of the remote database
    #[arg(long)]
    dry_run: bool,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ConfigLoader::load().context("failed to load config")?,
    };

    if cli.dry_run {
        config.store.backend = StoreBackend::Memory;
    }

    ConfigLoader::validate(&config).context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let _guard = init_tracing(&config.logging).context("failed to initialise logging")?;

    info!(
        app = %config.app_name,
        environment = %config.environment,
        store = ?config.store.backend,
        scanner = ?config.scanner.backend,
        "Starting rollcall..."
    );

    let store = StorageFactory::create(&config.store).context("failed to create store")?;
    if let Err(e) = StorageFactory::health_check(store.as_ref()).await {
        warn!(error = %e, "Store health check failed, continuing");
    }

    let scanner = create_scanner(&config.scanner);
    let mut poll = PollLoop::new(scanner, Arc::new(SystemClock), store, config.poll.clone());

    if config.metrics.enabled {
        let metrics = PollMetrics::new().context("failed to register metrics")?;
        poll = poll.with_metrics(metrics, config.metrics.textfile_path.clone());
    }

    if cli.once {
        let report = poll.run_cycle().await;
        info!(
            cycle = %report.cycle_id,
            detected = report.detected,
            marks = report.marks.len(),
            failed = report.failed_steps.len(),
            "Single cycle finished"
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poll.run(cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();

    handle.await.context("poll loop task failed to join")?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
