//! Vigil Binary Entry Point
//!
//! Loads the YAML configuration, schedules every configured target and
//! records measurements until interrupted.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil::{
    InMemoryMetricStore, JsonLinesMetricStore, MetricService, MetricStore, Scheduler,
    TargetService, config::AppConfig, config::parse_duration,
};

/// Vigil - Periodic HTTP Scrape Scheduler
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/vigil.yaml", env = "VIGIL_CONFIG")]
    config: String,

    /// HTTP client timeout, e.g. "5s" (overrides config file)
    #[arg(long, env = "VIGIL_CLIENT_TIMEOUT", value_parser = parse_duration)]
    client_timeout: Option<std::time::Duration>,

    /// JSON-lines metrics file (overrides config file)
    #[arg(long, env = "VIGIL_OUTPUT")]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vigil=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Vigil - Periodic HTTP Scrape Scheduler");

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // CLI > ENV > config file
    if let Some(timeout) = cli.client_timeout {
        config.client.timeout = timeout;
    }
    if let Some(output) = cli.output {
        config.output.path = Some(output);
    }
    config.validate()?;

    let client = config.client.build_client()?;
    let scheduler = Arc::new(Scheduler::new(client));

    let store: Arc<dyn MetricStore> = match config.output.path {
        Some(ref path) => Arc::new(JsonLinesMetricStore::open(path).await?),
        None => {
            tracing::warn!("No output path configured; metrics are kept in memory only");
            Arc::new(InMemoryMetricStore::new())
        }
    };
    let targets = TargetService::new(scheduler, MetricService::new(store));

    let mut started = 0;
    for target in config.targets {
        let name = target.name.clone();
        match targets.create(target).await {
            Ok(t) => {
                tracing::info!("Scheduled target: {} ({}, every {:?})", t.name, t.url, t.interval);
                started += 1;
            }
            Err(e) => tracing::error!("Failed to schedule target '{}': {}", name, e),
        }
    }
    tracing::info!("{} targets scheduled", started);
    tracing::info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;

    tracing::info!("Shutting down scrapers...");
    targets.shutdown(config.scrape.shutdown_timeout).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
