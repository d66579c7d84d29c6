//! Sanitize desk endpoints

use axum::{extract::State, Json};
use flagbot_common::db::ActiveAssignment;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::sanitize::{InputOutcome, SessionSnapshot};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SanitizeRequest {
    pub review_item_id: i64,
    pub reviewer_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SanitizeResponse {
    /// False when the reviewer did not hold the item
    pub accepted: bool,
    /// Assignments cleared by the request
    pub affected: Vec<ActiveAssignment>,
}

/// POST /api/sanitize
pub async fn request_sanitize(
    State(state): State<AppState>,
    Json(req): Json<SanitizeRequest>,
) -> ApiResult<Json<SanitizeResponse>> {
    let affected = state.desk.request(req.review_item_id, req.reviewer_id).await?;
    Ok(Json(SanitizeResponse {
        accepted: affected.is_some(),
        affected: affected.unwrap_or_default(),
    }))
}

/// GET /api/sanitize
pub async fn current_session(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    state
        .desk
        .current()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No sanitize session".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct SanitizeInput {
    pub text: String,
}

/// POST /api/sanitize/input
pub async fn sanitize_input(
    State(state): State<AppState>,
    Json(req): Json<SanitizeInput>,
) -> ApiResult<Json<InputOutcome>> {
    state
        .desk
        .input(&req.text)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No sanitize session".to_string()))
}

#[derive(Debug, Serialize)]
pub struct ResolvedResponse {
    pub review_item_id: i64,
    /// Session opened for the next waiting item, if any
    pub next: Option<SessionSnapshot>,
}

/// POST /api/sanitize/approve
pub async fn approve(State(state): State<AppState>) -> ApiResult<Json<ResolvedResponse>> {
    let review_item_id = state
        .desk
        .approve()
        .await?
        .ok_or_else(|| ApiError::NotFound("No sanitize session".to_string()))?;

    Ok(Json(ResolvedResponse {
        review_item_id,
        next: state.desk.current().await,
    }))
}

/// POST /api/sanitize/reject
pub async fn reject(State(state): State<AppState>) -> ApiResult<Json<ResolvedResponse>> {
    let review_item_id = state
        .desk
        .reject()
        .await?
        .ok_or_else(|| ApiError::NotFound("No sanitize session".to_string()))?;

    Ok(Json(ResolvedResponse {
        review_item_id,
        next: state.desk.current().await,
    }))
}
