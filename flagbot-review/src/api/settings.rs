//! Runtime edits to ingest settings
//!
//! Edits apply immediately and, when the service was started from a config
//! file, are written back to it.

use axum::{extract::State, Json};
use flagbot_common::config::FlagBotConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::IngestSettings;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub flag_threshold: f64,
    pub scan_channels: Vec<i64>,
    pub blacklist: Vec<String>,
}

impl From<&FlagBotConfig> for IngestSummary {
    fn from(config: &FlagBotConfig) -> Self {
        Self {
            flag_threshold: config.review.flag_threshold,
            scan_channels: config.review.scan_channels.clone(),
            blacklist: config.review.blacklist.clone(),
        }
    }
}

/// Apply an edit to the persisted config, then rebuild ingest settings from it
async fn edit_config<F>(state: &AppState, edit: F) -> ApiResult<IngestSummary>
where
    F: FnOnce(&mut FlagBotConfig),
{
    let mut ingest = state.ingest.write().await;

    let mut config = match &state.config_path {
        Some(path) => FlagBotConfig::load(path)?,
        None => FlagBotConfig::default(),
    };
    // The running settings win over whatever the file says
    config.review.flag_threshold = ingest.flag_threshold;
    config.review.sample_rate = ingest.sample_rate;
    config.review.scan_channels = ingest.scan_channels.clone();
    config.review.blacklist = ingest.blacklist.clone();

    edit(&mut config);

    let updated = IngestSettings::from_config(&config.review)?;
    if let Some(path) = &state.config_path {
        config.save(path)?;
    }

    *ingest = updated;
    Ok(IngestSummary::from(&config))
}

#[derive(Debug, Deserialize)]
pub struct BlacklistRequest {
    pub phrase: String,
}

/// POST /api/blacklist
pub async fn add_blacklist_phrase(
    State(state): State<AppState>,
    Json(req): Json<BlacklistRequest>,
) -> ApiResult<Json<IngestSummary>> {
    let phrase = req.phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return Err(ApiError::BadRequest("phrase must not be empty".to_string()));
    }

    let summary = edit_config(&state, |config| {
        if !config.review.blacklist.contains(&phrase) {
            config.review.blacklist.push(phrase.clone());
        }
    })
    .await?;

    info!(phrase = %phrase, "Blacklist phrase added");
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ScanChannelRequest {
    pub channel_id: i64,
}

/// POST /api/scan-channels
pub async fn add_scan_channel(
    State(state): State<AppState>,
    Json(req): Json<ScanChannelRequest>,
) -> ApiResult<Json<IngestSummary>> {
    let summary = edit_config(&state, |config| {
        if !config.review.scan_channels.contains(&req.channel_id) {
            config.review.scan_channels.push(req.channel_id);
        }
    })
    .await?;

    info!(channel_id = req.channel_id, "Channel added to scan list");
    Ok(Json(summary))
}

/// POST /api/config/reload
///
/// Re-read ingest settings from the config file. Quorum size and channels of
/// the review and sanitize views take effect on restart only.
pub async fn reload_config(State(state): State<AppState>) -> ApiResult<Json<IngestSummary>> {
    let path = state
        .config_path
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Service was not started from a config file".to_string()))?;

    let config = FlagBotConfig::load(path)?;
    config.validate()?;
    let updated = IngestSettings::from_config(&config.review)?;
    *state.ingest.write().await = updated;

    info!(path = %path.display(), "Configuration reloaded");
    Ok(Json(IngestSummary::from(&config)))
}
