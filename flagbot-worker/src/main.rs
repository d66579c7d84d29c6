//! flagbot-worker - Main entry point
//!
//! Claims one identity slot, keeps its lease alive and drains the job queue.
//! Run as many copies as there are slots; extras wait for a slot to free up.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flagbot_common::config::{resolve_config_path, FlagBotConfig};
use flagbot_common::db::init_database;
use flagbot_common::logging::init_logging;
use flagbot_common::presenter::{LogPresenter, Presenter, WebhookPresenter};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use flagbot_worker::reactions::{account_id, HttpReactionApi};
use flagbot_worker::retry::RetryPolicy;
use flagbot_worker::stats::{StatsRefresher, StatsSettings};
use flagbot_worker::{Dispatcher, LeaseStore, LeaseTimings, WorkerCoordinator};

/// Command-line arguments for flagbot-worker
#[derive(Parser, Debug)]
#[command(name = "flagbot-worker")]
#[command(about = "Job worker for FlagBot")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "FLAGBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = FlagBotConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    if let Err(e) = config.validate_worker() {
        error!("Refusing to start: {}", e);
        return Err(e).context("Invalid worker configuration");
    }

    info!("Starting flagbot-worker v{}", env!("CARGO_PKG_VERSION"));

    let db = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let review_bot_id = config
        .worker
        .review_bot_credential
        .as_deref()
        .map(account_id)
        .transpose()
        .context("Unusable review bot credential")?
        .context("worker.review_bot_credential is required")?;

    let slots = config.worker.worker_count as usize;
    let coordinator = Arc::new(WorkerCoordinator::new(
        LeaseStore::new(db.clone()),
        config.worker.credentials[..slots].to_vec(),
        LeaseTimings::from(&config.worker),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Waiting for a slot must not outlive a shutdown request
    let mut claim_shutdown = shutdown_rx.clone();
    let identity = tokio::select! {
        identity = coordinator.claim() => identity,
        _ = claim_shutdown.changed() => {
            info!("Shutdown before a slot was claimed");
            return Ok(());
        }
    };

    let reactions = Arc::new(
        HttpReactionApi::new(
            &config.worker.api_base_url,
            identity.credential.clone(),
            config.worker.requests_per_second,
        )
        .context("Failed to build chat API client")?,
    );

    let presenter: Arc<dyn Presenter> = match &config.presentation.webhook_url {
        Some(url) => Arc::new(
            WebhookPresenter::new(url.clone()).context("Failed to build webhook presenter")?,
        ),
        None => {
            warn!("No presentation.webhook_url configured, stats are only logged");
            Arc::new(LogPresenter)
        }
    };

    let stats = StatsRefresher::new(
        db.clone(),
        presenter,
        StatsSettings {
            stats_channel: config.review.stats_channel,
            min_votes: config.review.min_votes,
            thresholds: config.trusted_reviewer,
            cooldown: config.worker.stats_cooldown(),
            retry: RetryPolicy::default(),
        },
    );

    let renewal = coordinator.spawn_renewal(identity.slot, shutdown_rx.clone());
    let dispatcher = Dispatcher::new(
        db,
        reactions,
        review_bot_id,
        stats,
        config.worker.job_poll_interval(),
    );

    info!(slot = identity.slot, "Worker ready");
    dispatcher.run(shutdown_rx).await;

    if let Err(e) = renewal.await {
        warn!("Lease renewal task ended abnormally: {}", e);
    }
    coordinator
        .release(identity.slot)
        .await
        .context("Failed to release worker slot")?;

    info!("Worker shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
