//! Bookclub study service.
//!
//! Runs the study lifecycle over in-memory storage: seeds demo data, then
//! sweeps studies through `OPEN → CLOSE → END` once a day until Ctrl+C or
//! SIGTERM.

use bookclub::{Config, seed_demo_data};
use bookclub_core::environment::{Clock, SystemClock};
use bookclub_runtime::metrics::MetricsServer;
use bookclub_runtime::{
    DailySchedule, DailyTicker, InMemoryAccountDirectory, InMemoryStudyRepository,
    StudyEnvironment, StudyRuntime, SweepScheduler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize tracing
    let default_filter = format!(
        "bookclub={level},bookclub_runtime={level}",
        level = config.server.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bookclub study service");
    info!(
        sweep_at = %config.sweep.at,
        utc_offset = %config.clock.offset,
        update_policy = ?config.study.update_policy,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.server.metrics_addr);
    if config.server.metrics_enabled {
        metrics.start()?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::with_offset(config.clock.offset));
    let studies = InMemoryStudyRepository::new();
    let accounts = InMemoryAccountDirectory::new();
    let environment = StudyEnvironment::new(
        Arc::clone(&clock),
        Arc::new(studies.clone()),
        Arc::new(accounts.clone()),
    );
    let runtime = StudyRuntime::with_policy(environment, config.study.update_policy);
    info!(today = %clock.today(), "Study runtime ready");

    if config.study.seed_demo_data {
        seed_demo_data(&runtime, &accounts).await?;
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let ticker = DailyTicker::new(
        DailySchedule::new(config.sweep.at, config.clock.offset),
        Arc::clone(&clock),
    );
    let scheduler = SweepScheduler::new(runtime.sweep(), Box::new(ticker), shutdown_rx)
        .run_on_start(config.sweep.run_on_start)
        .spawn();
    info!("Sweep scheduler spawned");

    shutdown_signal().await;

    info!("Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(Duration::from_secs(10), scheduler).await {
        Ok(Ok(summary)) => info!(
            completed = summary.completed,
            skipped = summary.skipped,
            "Sweep scheduler stopped gracefully"
        ),
        Ok(Err(e)) => warn!(error = %e, "Sweep scheduler task failed"),
        Err(_) => warn!("Sweep scheduler shutdown timed out"),
    }

    if let Some(rendered) = metrics.render() {
        tracing::debug!(metrics = %rendered, "Final metrics snapshot");
    }

    info!(studies = studies.len(), "Graceful shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
