//! Database models

use crate::categories::{ScoreVector, VoteVector};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to something the presentation layer rendered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ExternalRef(pub String);

impl ExternalRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExternalRef {
    fn from(value: String) -> Self {
        ExternalRef(value)
    }
}

/// A classified message; immutable once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub id: i64,
    pub content: String,
    pub scores: ScoreVector,
}

/// An entry in the review queue
///
/// `active = false` means finalized or withdrawn; `in_sanitize = true` parks
/// the item outside the assignable set until the sanitize detour completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewItem {
    pub id: i64,
    pub scored_item_id: i64,
    pub clean_content: String,
    pub active: bool,
    pub in_sanitize: bool,
}

impl ReviewItem {
    /// Whether the item may still be handed to a reviewer
    pub fn is_assignable(&self) -> bool {
        self.active && !self.in_sanitize
    }
}

/// An opted-in reviewer; soft-deleted via `active = false`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reviewer {
    pub user_id: i64,
    pub channel_id: i64,
    pub active: bool,
    pub trusted: bool,
    pub date_created: NaiveDateTime,
}

/// One row of the review log: a (item, reviewer) pairing
///
/// `active = true` while awaiting that reviewer's vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewAssignment {
    pub review_item_id: i64,
    pub reviewer_id: i64,
    pub message_ref: Option<ExternalRef>,
    pub active: bool,
    #[sqlx(skip)]
    pub votes: VoteVector,
}

/// An open assignment together with where its view lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveAssignment {
    pub review_item_id: i64,
    pub reviewer_id: i64,
    pub channel_id: i64,
    pub message_ref: Option<ExternalRef>,
}

/// Finalized outcome of a review item, one 0/1 value per category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub review_item_id: i64,
    pub content: String,
    pub outcome: VoteVector,
}
