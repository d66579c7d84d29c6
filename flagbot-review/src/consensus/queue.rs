//! Store-level operations of the review queue
//!
//! Each method is one consistent step against the store. Sequencing these
//! steps for an event (a vote, a sanitize request) lives in `workflow`.

use chrono::Utc;
use flagbot_common::categories::{normalize_votes, ScoreVector, VoteVector};
use flagbot_common::config::ReviewConfig;
use flagbot_common::db::scores::insert_scored_item;
use flagbot_common::db::{ActiveAssignment, Decision, ExternalRef, ReviewAssignment, ReviewItem, Reviewer};
use flagbot_common::presenter::Presenter;
use flagbot_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::decision::decide;
use crate::db::{assignments, review_items, reviewers};

/// Settings the queue reads on every operation
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    /// Quorum size
    pub min_votes: u32,

    /// Reactions cleared from a review view after its vote
    pub review_emojis: Vec<String>,

    /// CSV file receiving every decision as a labeled row
    pub training_export: Option<PathBuf>,
}

impl From<&ReviewConfig> for ReviewSettings {
    fn from(config: &ReviewConfig) -> Self {
        Self {
            min_votes: config.min_votes,
            review_emojis: config.review_emojis.clone(),
            training_export: config.training_export.clone(),
        }
    }
}

/// Result of submitting a vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote stored; the reviewer's view is identified by `message_ref`
    Recorded {
        channel_id: i64,
        message_ref: Option<ExternalRef>,
    },

    /// No open assignment matched; a stale vote to be ignored
    NotFound,
}

/// A decision together with the open assignments finalize closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub decision: Decision,
    pub withdrawn: Vec<ActiveAssignment>,
}

/// The consensus review queue
pub struct ReviewQueue {
    pub(crate) db: SqlitePool,
    pub(crate) settings: ReviewSettings,
    pub(crate) presenter: Arc<dyn Presenter>,

    /// Serializes "find empty reviewer -> pop -> assign" and vote handling
    pub(crate) section: Mutex<()>,
}

impl ReviewQueue {
    pub fn new(db: SqlitePool, settings: ReviewSettings, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            db,
            settings,
            presenter,
            section: Mutex::new(()),
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    /// Persist a classified item and queue it for review, then backfill
    pub async fn submit_scored(&self, content: &str, scores: &ScoreVector) -> Result<i64> {
        self.submit_cleaned(content, content, scores).await
    }

    /// Like `submit_scored`, with reviewer-facing content already normalized
    pub async fn submit_cleaned(
        &self,
        content: &str,
        clean_content: &str,
        scores: &ScoreVector,
    ) -> Result<i64> {
        let mut tx = self.db.begin().await?;
        let scored_item_id = insert_scored_item(&mut tx, content, scores).await?;
        let review_item_id =
            review_items::insert_review_item(&mut tx, scored_item_id, clean_content).await?;
        tx.commit().await?;

        info!(review_item_id, scored_item_id, "Item queued for review");

        self.fill_empty_queues().await?;
        Ok(review_item_id)
    }

    pub async fn find_empty_reviewers(&self) -> Result<Vec<Reviewer>> {
        reviewers::find_empty_reviewers(&self.db).await
    }

    pub async fn pop_next_reviewable(&self, reviewer_id: i64) -> Result<Option<ReviewItem>> {
        review_items::pop_next_reviewable(&self.db, reviewer_id, self.settings.min_votes).await
    }

    /// Open an assignment of `item` to `reviewer`
    ///
    /// Refuses with `Error::Invariant` when the reviewer already holds an open
    /// assignment or the item can no longer be assigned to them.
    pub async fn assign(&self, item: &ReviewItem, reviewer: &Reviewer) -> Result<ReviewAssignment> {
        if let Some(open) = assignments::active_assignment_for(&self.db, reviewer.user_id).await? {
            error!(
                reviewer_id = reviewer.user_id,
                held_item = open.review_item_id,
                requested_item = item.id,
                "Refusing assignment: reviewer already holds an open item"
            );
            return Err(Error::Invariant(format!(
                "Reviewer {} already holds item {}",
                reviewer.user_id, open.review_item_id
            )));
        }

        let current = review_items::get_review_item(&self.db, item.id).await?;
        let still_assignable = current.as_ref().is_some_and(ReviewItem::is_assignable)
            && review_items::cast_vote_count(&self.db, item.id).await?
                < i64::from(self.settings.min_votes)
            && assignments::get_assignment(&self.db, item.id, reviewer.user_id)
                .await?
                .is_none();
        if !still_assignable {
            error!(
                reviewer_id = reviewer.user_id,
                review_item_id = item.id,
                "Refusing assignment: item is not eligible"
            );
            return Err(Error::Invariant(format!(
                "Item {} is not assignable to reviewer {}",
                item.id, reviewer.user_id
            )));
        }

        let mut tx = self.db.begin().await?;
        if let Err(e) = assignments::insert_assignment(&mut tx, item.id, reviewer.user_id).await {
            error!(
                reviewer_id = reviewer.user_id,
                review_item_id = item.id,
                error = %e,
                "Refusing assignment: store rejected it"
            );
            return Err(Error::Invariant(format!(
                "Assignment of item {} to reviewer {} rejected: {}",
                item.id, reviewer.user_id, e
            )));
        }
        tx.commit().await?;

        debug!(reviewer_id = reviewer.user_id, review_item_id = item.id, "Assigned");

        Ok(ReviewAssignment {
            review_item_id: item.id,
            reviewer_id: reviewer.user_id,
            message_ref: None,
            active: true,
            votes: VoteVector::new(),
        })
    }

    /// Remember where an assignment's view lives
    pub async fn record_message_ref(
        &self,
        review_item_id: i64,
        reviewer_id: i64,
        message_ref: &ExternalRef,
    ) -> Result<()> {
        if !assignments::set_message_ref(&self.db, review_item_id, reviewer_id, message_ref).await? {
            return Err(Error::NotFound(format!(
                "Assignment of item {} to reviewer {}",
                review_item_id, reviewer_id
            )));
        }
        Ok(())
    }

    /// Store a reviewer's votes and close their assignment
    pub async fn submit_vote(
        &self,
        review_item_id: i64,
        reviewer_id: i64,
        votes: &VoteVector,
    ) -> Result<VoteOutcome> {
        let votes = normalize_votes(votes);

        let mut tx = self.db.begin().await?;
        let Some(message_ref) =
            assignments::close_with_votes(&mut tx, review_item_id, reviewer_id, &votes).await?
        else {
            debug!(review_item_id, reviewer_id, "Stale vote ignored");
            return Ok(VoteOutcome::NotFound);
        };
        tx.commit().await?;

        let channel_id = reviewers::get_reviewer(&self.db, reviewer_id)
            .await?
            .map(|r| r.channel_id)
            .unwrap_or_default();

        info!(review_item_id, reviewer_id, "Vote recorded");
        Ok(VoteOutcome::Recorded {
            channel_id,
            message_ref,
        })
    }

    /// Finalize the item if it has reached quorum
    ///
    /// A no-op returning `None` for an item below quorum or already finalized.
    pub async fn check_quorum(&self, review_item_id: i64) -> Result<Option<Finalized>> {
        let Some(item) = review_items::get_review_item(&self.db, review_item_id).await? else {
            return Ok(None);
        };
        if !item.active || item.in_sanitize {
            return Ok(None);
        }

        let cast = assignments::cast_votes_on(&self.db, review_item_id).await?;
        let Some(outcome) = decide(&cast, self.settings.min_votes) else {
            return Ok(None);
        };

        // Lost the race to another finalizer
        let Some(withdrawn) = self.finalize(review_item_id, &outcome).await? else {
            return Ok(None);
        };
        Ok(Some(Finalized {
            decision: Decision {
                review_item_id,
                content: item.clean_content,
                outcome,
            },
            withdrawn,
        }))
    }

    /// Close an item and all of its assignments for good
    ///
    /// Returns the assignments that were still open; their views must be
    /// withdrawn by the caller. `None` if the item was already finalized.
    pub async fn finalize(
        &self,
        review_item_id: i64,
        outcome: &VoteVector,
    ) -> Result<Option<Vec<ActiveAssignment>>> {
        let mut tx = self.db.begin().await?;
        let open = assignments::active_assignments_on(&mut tx, review_item_id).await?;

        if !review_items::deactivate(&mut tx, review_item_id).await? {
            return Ok(None);
        }
        assignments::close_all_on(&mut tx, review_item_id).await?;
        assignments::record_decision(&mut tx, review_item_id, outcome).await?;
        tx.commit().await?;

        let flagged: Vec<&str> = outcome
            .iter()
            .filter(|(_, v)| **v == 1)
            .map(|(c, _)| c.as_str())
            .collect();
        info!(
            review_item_id,
            flagged = ?flagged,
            withdrawn = open.len(),
            "Item finalized"
        );

        Ok(Some(open))
    }

    /// Move an item into the sanitize detour
    ///
    /// Returns every open assignment on the item (their views must be
    /// invalidated) and removes all of the item's assignments.
    pub async fn request_sanitize(&self, review_item_id: i64) -> Result<Vec<ActiveAssignment>> {
        let mut tx = self.db.begin().await?;
        let open = assignments::active_assignments_on(&mut tx, review_item_id).await?;

        let now_ms = Utc::now().timestamp_millis();
        if !review_items::mark_in_sanitize(&mut tx, review_item_id, now_ms).await? {
            return Err(Error::InvalidInput(format!(
                "Item {} is not open for sanitizing",
                review_item_id
            )));
        }
        assignments::delete_all_on(&mut tx, review_item_id).await?;
        tx.commit().await?;

        info!(review_item_id, affected = open.len(), "Sanitize requested");
        Ok(open)
    }

    /// Commit sanitized content; the item re-enters the queue with no assignments
    pub async fn approve_sanitize(&self, review_item_id: i64, clean_content: &str) -> Result<()> {
        {
            let _section = self.section.lock().await;
            let mut tx = self.db.begin().await?;
            if !review_items::release_from_sanitize(&mut tx, review_item_id, clean_content).await? {
                return Err(Error::NotFound(format!(
                    "Item {} is not awaiting sanitize",
                    review_item_id
                )));
            }
            assignments::delete_all_on(&mut tx, review_item_id).await?;
            tx.commit().await?;
        }

        info!(review_item_id, "Sanitized item returned to review");

        // The commit stands; a failed backfill is retried by the next event
        if let Err(e) = self.fill_empty_queues().await {
            warn!(review_item_id, error = %e, "Backfill after sanitize approval failed");
        }
        Ok(())
    }

    /// Discard an item from the sanitize detour; it is never re-queued
    pub async fn reject_sanitize(&self, review_item_id: i64) -> Result<()> {
        if !review_items::drop_from_sanitize(&self.db, review_item_id).await? {
            return Err(Error::NotFound(format!(
                "Item {} is not awaiting sanitize",
                review_item_id
            )));
        }

        info!(review_item_id, "Sanitize rejected, item dropped");
        Ok(())
    }

    /// Opt a user in as reviewer, then give them work
    pub async fn add_reviewer(&self, user_id: i64, channel_id: i64) -> Result<Reviewer> {
        let reviewer = reviewers::add_reviewer(&self.db, user_id, channel_id).await?;
        info!(user_id, channel_id, "Reviewer added");

        self.fill_empty_queues().await?;
        Ok(reviewer)
    }

    /// Soft-delete a reviewer and withdraw their open assignment
    pub async fn remove_reviewer(&self, user_id: i64) -> Result<()> {
        let withdrawn_view = {
            let _section = self.section.lock().await;
            let mut tx = self.db.begin().await?;
            if !reviewers::deactivate_reviewer(&mut tx, user_id).await? {
                return Err(Error::NotFound(format!("Reviewer {}", user_id)));
            }
            let view = assignments::delete_open_assignment(&mut tx, user_id).await?;
            tx.commit().await?;
            view
        };

        info!(user_id, "Reviewer removed");

        if let Some(view) = withdrawn_view {
            self.withdraw_view(&view).await;
        }
        self.fill_empty_queues().await
    }
}
