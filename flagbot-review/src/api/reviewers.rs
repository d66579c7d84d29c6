//! Reviewer roster and personal stats endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use flagbot_common::db::Reviewer;
use flagbot_common::deviance::{deviance_for, remaining_for, DevianceReport};
use serde::{Deserialize, Serialize};

use crate::db::reviewers;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddReviewerRequest {
    pub user_id: i64,
    /// Channel where this reviewer's items are shown
    pub channel_id: i64,
}

/// POST /api/reviewers
pub async fn add_reviewer(
    State(state): State<AppState>,
    Json(req): Json<AddReviewerRequest>,
) -> ApiResult<(StatusCode, Json<Reviewer>)> {
    let reviewer = state.queue.add_reviewer(req.user_id, req.channel_id).await?;
    Ok((StatusCode::CREATED, Json(reviewer)))
}

/// DELETE /api/reviewers/:user_id
pub async fn remove_reviewer(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.queue.remove_reviewer(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct DevianceResponse {
    #[serde(flatten)]
    pub report: DevianceReport,
    pub remaining: i64,
    pub trusted: bool,
    /// Whether the next stats refresh would mark this reviewer trusted
    pub meets_trust_thresholds: bool,
}

/// GET /api/reviewers/:user_id/deviance
pub async fn get_deviance(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<DevianceResponse>> {
    let db = state.queue.db();
    let reviewer = reviewers::get_reviewer(db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Reviewer {}", user_id)))?;

    let report = deviance_for(db, user_id).await?;
    let remaining = remaining_for(db, user_id, state.queue.settings().min_votes).await?;

    let meets_trust_thresholds = report.is_trusted(&state.trust);
    Ok(Json(DevianceResponse {
        report,
        remaining,
        trusted: reviewer.trusted,
        meets_trust_thresholds,
    }))
}
