//! Vote endpoint

use axum::{extract::State, Json};
use flagbot_common::db::Decision;
use flagbot_common::VoteVector;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub review_item_id: i64,
    pub reviewer_id: i64,
    /// Categories the reviewer marked; missing ones count as 0
    #[serde(default)]
    pub votes: VoteVector,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    /// Present when this vote completed quorum
    pub decision: Option<Decision>,
}

/// POST /api/votes
///
/// Stale votes (no open assignment) are accepted and ignored.
pub async fn submit_vote(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    let decision = state
        .queue
        .handle_vote(req.review_item_id, req.reviewer_id, &req.votes)
        .await?;
    Ok(Json(VoteResponse { decision }))
}
