//! flagbot-review - Main entry point
//!
//! Owns the consensus review queue and the sanitize desk, and serves the
//! HTTP command surface that platform adapters drive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flagbot_common::config::{resolve_config_path, FlagBotConfig};
use flagbot_common::db::init_database;
use flagbot_common::logging::init_logging;
use flagbot_common::presenter::{LogPresenter, Presenter, WebhookPresenter};
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use flagbot_review::classifier::{Classifier, HttpClassifier, IngestSettings};
use flagbot_review::consensus::{ReviewQueue, ReviewSettings};
use flagbot_review::sanitize::SanitizeDesk;
use flagbot_review::{build_router, AppState};

/// Command-line arguments for flagbot-review
#[derive(Parser, Debug)]
#[command(name = "flagbot-review")]
#[command(about = "Consensus review service for FlagBot")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "FLAGBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Override http.bind_addr
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = FlagBotConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting flagbot-review v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let db = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let presenter: Arc<dyn Presenter> = match &config.presentation.webhook_url {
        Some(url) => Arc::new(
            WebhookPresenter::new(url.clone()).context("Failed to build webhook presenter")?,
        ),
        None => {
            warn!("No presentation.webhook_url configured, views are only logged");
            Arc::new(LogPresenter)
        }
    };

    let classifier: Option<Arc<dyn Classifier>> = match &config.classifier.url {
        Some(url) => Some(Arc::new(
            HttpClassifier::new(url.clone()).context("Failed to build classifier client")?,
        )),
        None => {
            warn!("No classifier.url configured, only pre-scored submissions are accepted");
            None
        }
    };

    let queue = Arc::new(ReviewQueue::new(
        db.clone(),
        ReviewSettings::from(&config.review),
        presenter.clone(),
    ));
    let desk = Arc::new(SanitizeDesk::new(
        queue.clone(),
        presenter,
        config.review.sanitize_channel.unwrap_or_default(),
        config.review.sanitize_order,
    ));

    // Pick up where the previous process stopped
    if let Some(session) = desk.restore().await.context("Failed to restore sanitize session")? {
        info!(review_item_id = session.review_item_id, "Sanitize session restored");
    }
    queue
        .fill_empty_queues()
        .await
        .context("Failed to fill reviewer queues")?;

    let ingest = IngestSettings::from_config(&config.review).context("Invalid blacklist")?;
    let bind_addr = args.bind.unwrap_or_else(|| config.http.bind_addr.clone());

    let state = AppState {
        queue,
        desk,
        classifier,
        ingest: Arc::new(RwLock::new(ingest)),
        trust: config.trusted_reviewer,
        config_path: Some(config_path),
    };
    let app = build_router(state);

    info!("Starting HTTP server on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
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
