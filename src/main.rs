//! PulseWatch - single-target uptime monitor.
//!
//! Probes one HTTP endpoint on a fixed, ethically spaced interval, keeps the
//! results in SQLite and serves them through a small JSON API.

mod config;
mod db;
mod probe;
mod scheduler;
mod web;

use config::ServerConfig;
use db::Store;
use scheduler::{RetentionManager, Scheduler};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pulsewatch=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg =
        ServerConfig::load().inspect_err(|e| tracing::error!("Configuration error: {}", e))?;
    let monitor = &cfg.monitor;

    // Initialize database
    let store = Arc::new(Store::open(&cfg.db_path)?);
    tracing::info!("Using database at {}", cfg.db_path);

    // Create scheduler; refuses unsafe intervals and bad targets
    let scheduler = Arc::new(
        Scheduler::new(monitor, store.clone())
            .inspect_err(|e| tracing::error!("Configuration error: {}", e))?,
    );

    tracing::info!("Starting PulseWatch on {}...", cfg.bind_addr());
    tracing::info!("Target: {} ({})", monitor.target_url, monitor.method);
    tracing::info!(
        "Interval: {}s, timeout: {:.1}s, healthy status: {}, manual cooldown: {}s",
        monitor.interval.as_secs(),
        monitor.timeout.as_secs_f64(),
        monitor.healthy,
        monitor.manual_cooldown.as_secs()
    );
    tracing::info!("Only monitor websites you own or have permission to monitor");

    scheduler.start();

    let retention = cfg.retention().map(|max_age| {
        tracing::info!("Retaining results for {} days", max_age.num_days());
        let manager = RetentionManager::new(store.clone(), max_age);
        let handle = manager.start();
        (manager, handle)
    });

    // Serve until a shutdown signal arrives
    let server = Server::new(cfg.clone(), store, scheduler.clone());
    let served = server.start(shutdown_signal()).await;

    tracing::info!("Shutting down, waiting for any in-flight probe...");
    scheduler.shutdown().await;
    if let Some((manager, handle)) = retention {
        manager.stop();
        if let Err(e) = handle.await {
            tracing::error!("Retention: task failed: {}", e);
        }
    }
    tracing::info!("Shutdown complete");

    served
}

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
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
