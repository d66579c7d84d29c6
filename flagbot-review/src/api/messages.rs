//! Content submission endpoints

use axum::{extract::State, Json};
use flagbot_common::categories::{validate_scores, ScoreVector};
use serde::Deserialize;

use crate::classifier::{ingest_message, Admission, IngestOutcome};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub channel_id: i64,
    pub content: String,
}

/// POST /api/messages
///
/// Clean, classify and, if any category exceeds the flag threshold, queue
/// the message for review. A small random share of unflagged messages is
/// queued too.
pub async fn submit_message(
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<Json<IngestOutcome>> {
    let classifier = state
        .classifier
        .clone()
        .ok_or_else(|| ApiError::Unavailable("No classifier configured".to_string()))?;

    let (flag_threshold, sample_rate, clean_content) = {
        let ingest = state.ingest.read().await;
        if !ingest.scans(req.channel_id) {
            return Ok(Json(IngestOutcome::Ignored));
        }
        (
            ingest.flag_threshold,
            ingest.sample_rate,
            ingest.cleaner.clean(&req.content),
        )
    };

    let outcome = ingest_message(
        &state.queue,
        classifier,
        flag_threshold,
        sample_rate,
        &req.content,
        &clean_content,
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ScoredRequest {
    pub content: String,
    pub scores: ScoreVector,
}

/// POST /api/scored
///
/// Submit content that was classified elsewhere.
pub async fn submit_scored(
    State(state): State<AppState>,
    Json(req): Json<ScoredRequest>,
) -> ApiResult<Json<IngestOutcome>> {
    validate_scores(&req.scores)?;
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let (flag_threshold, sample_rate) = {
        let ingest = state.ingest.read().await;
        (ingest.flag_threshold, ingest.sample_rate)
    };
    let Some(admission) = Admission::for_scores(&req.scores, flag_threshold, sample_rate) else {
        return Ok(Json(IngestOutcome::NotFlagged));
    };

    let review_item_id = state.queue.submit_scored(&req.content, &req.scores).await?;
    Ok(Json(admission.outcome(review_item_id)))
}
