//! flagbot-review library - consensus review service
//!
//! Flagged content waits in a review queue until a quorum of reviewers has
//! voted on it. Reviewers can divert an item through the sanitize desk for
//! redaction. Everything is driven through a small HTTP command surface.

use axum::Router;
use flagbot_common::config::TrustedReviewerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod classifier;
pub mod consensus;
pub mod db;
pub mod error;
pub mod sanitize;
pub mod text;
pub mod training;

use classifier::{Classifier, IngestSettings};
use consensus::ReviewQueue;
use sanitize::SanitizeDesk;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<ReviewQueue>,
    pub desk: Arc<SanitizeDesk>,

    /// Absent when no classifier endpoint is configured
    pub classifier: Option<Arc<dyn Classifier>>,

    /// Scan list, flag threshold and blacklist; editable at runtime
    pub ingest: Arc<RwLock<IngestSettings>>,

    pub trust: TrustedReviewerConfig,

    /// Where runtime edits are persisted, if anywhere
    pub config_path: Option<PathBuf>,
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{delete, get, post};

    let api = Router::new()
        .route("/api/messages", post(api::messages::submit_message))
        .route("/api/scored", post(api::messages::submit_scored))
        .route("/api/reviewers", post(api::reviewers::add_reviewer))
        .route("/api/reviewers/:user_id", delete(api::reviewers::remove_reviewer))
        .route("/api/reviewers/:user_id/deviance", get(api::reviewers::get_deviance))
        .route("/api/votes", post(api::votes::submit_vote))
        .route(
            "/api/sanitize",
            post(api::sanitize::request_sanitize).get(api::sanitize::current_session),
        )
        .route("/api/sanitize/input", post(api::sanitize::sanitize_input))
        .route("/api/sanitize/approve", post(api::sanitize::approve))
        .route("/api/sanitize/reject", post(api::sanitize::reject))
        .route("/api/blacklist", post(api::settings::add_blacklist_phrase))
        .route("/api/scan-channels", post(api::settings::add_scan_channel))
        .route("/api/config/reload", post(api::settings::reload_config));

    Router::new()
        .merge(api)
        .merge(api::health::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
