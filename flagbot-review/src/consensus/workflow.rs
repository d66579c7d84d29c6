//! Event handling on top of the queue's store operations
//!
//! Every path that changes who holds what runs under the section lock, so
//! "find empty reviewer -> pop -> assign" can never interleave with itself.

use flagbot_common::db::scores::get_scores;
use flagbot_common::db::{ActiveAssignment, Decision, ExternalRef, ReviewItem};
use flagbot_common::jobs::{push_job, Job};
use flagbot_common::{Result, VoteVector};
use tracing::{debug, info, warn};

use super::queue::{ReviewQueue, VoteOutcome};
use crate::db::assignments;
use crate::training::append_training_row;

impl ReviewQueue {
    /// Give every idle reviewer their next item
    pub async fn fill_empty_queues(&self) -> Result<()> {
        let _section = self.section.lock().await;
        self.fill_empty_queues_locked().await
    }

    pub(crate) async fn fill_empty_queues_locked(&self) -> Result<()> {
        for reviewer in self.find_empty_reviewers().await? {
            let item = match self.pop_next_reviewable(reviewer.user_id).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    debug!(reviewer_id = reviewer.user_id, "No eligible item, reviewer idle");
                    continue;
                }
                Err(e) => {
                    warn!(reviewer_id = reviewer.user_id, error = %e, "Pop failed, reviewer left idle");
                    continue;
                }
            };

            if let Err(e) = self.assign(&item, &reviewer).await {
                warn!(reviewer_id = reviewer.user_id, review_item_id = item.id, error = %e, "Backfill skipped");
                continue;
            }
            self.surface(&item, reviewer.user_id, reviewer.channel_id, None).await;
        }
        Ok(())
    }

    /// Show an assigned item to its reviewer and record the view handle
    ///
    /// With `reuse` the existing view is edited in place; otherwise a new one
    /// is sent. Presentation failures leave the assignment in place.
    async fn surface(
        &self,
        item: &ReviewItem,
        reviewer_id: i64,
        channel_id: i64,
        reuse: Option<&ExternalRef>,
    ) {
        let scores = match get_scores(&self.db, item.scored_item_id).await {
            Ok(scores) => Some(scores),
            Err(e) => {
                warn!(review_item_id = item.id, error = %e, "Scores unavailable for view");
                None
            }
        };

        let sent = match reuse {
            Some(view) => self
                .presenter
                .edit_by_ref(view, &item.clean_content, scores.as_ref())
                .await
                .map(|_| view.clone()),
            None => {
                self.presenter
                    .render_and_send(channel_id, &item.clean_content, scores.as_ref())
                    .await
            }
        };

        match sent {
            Ok(view) => {
                if let Err(e) = self.record_message_ref(item.id, reviewer_id, &view).await {
                    warn!(review_item_id = item.id, reviewer_id, error = %e, "Could not record view");
                }
            }
            Err(e) => {
                warn!(review_item_id = item.id, reviewer_id, error = %e, "Could not surface item");
            }
        }
    }

    /// Move a reviewer whose assignment just closed on to their next item
    ///
    /// The old view is reused for the next item, or deleted if there is none.
    async fn advance_reviewer(&self, reviewer_id: i64, channel_id: i64, view: Option<&ExternalRef>) {
        let next = match self.pop_next_reviewable(reviewer_id).await {
            Ok(next) => next,
            Err(e) => {
                warn!(reviewer_id, error = %e, "Pop failed while advancing reviewer");
                None
            }
        };

        let assigned = match next {
            Some(item) => {
                let reviewer = crate::db::reviewers::get_reviewer(&self.db, reviewer_id).await;
                match reviewer {
                    Ok(Some(reviewer)) if reviewer.active => {
                        match self.assign(&item, &reviewer).await {
                            Ok(_) => Some(item),
                            Err(e) => {
                                warn!(reviewer_id, error = %e, "Could not advance reviewer");
                                None
                            }
                        }
                    }
                    _ => None,
                }
            }
            None => None,
        };

        match (assigned, view) {
            (Some(item), view) => self.surface(&item, reviewer_id, channel_id, view).await,
            (None, Some(view)) => self.withdraw_view(view).await,
            (None, None) => {}
        }
    }

    pub(crate) async fn withdraw_view(&self, view: &ExternalRef) {
        if let Err(e) = self.presenter.delete_by_ref(view).await {
            warn!(view = %view, error = %e, "Could not delete view");
        }
    }

    async fn enqueue(&self, job: Job) {
        if let Err(e) = push_job(&self.db, &job).await {
            warn!(method = job.method(), error = %e, "Could not enqueue job");
        }
    }

    /// Handle a reviewer's vote end to end
    ///
    /// A vote without a matching open assignment is silently ignored. Returns
    /// the decision when this vote completed quorum.
    pub async fn handle_vote(
        &self,
        review_item_id: i64,
        reviewer_id: i64,
        votes: &VoteVector,
    ) -> Result<Option<Decision>> {
        let _section = self.section.lock().await;

        let (channel_id, view) = match self.submit_vote(review_item_id, reviewer_id, votes).await? {
            VoteOutcome::NotFound => return Ok(None),
            VoteOutcome::Recorded {
                channel_id,
                message_ref,
            } => (channel_id, message_ref),
        };

        if let Some(view) = &view {
            for emoji in &self.settings.review_emojis {
                self.enqueue(Job::DeleteReactions {
                    channel_id,
                    message_ref: view.clone(),
                    emoji: emoji.clone(),
                })
                .await;
            }
        }

        let finalized = self.check_quorum(review_item_id).await?;

        self.advance_reviewer(reviewer_id, channel_id, view.as_ref()).await;

        let decision = match finalized {
            Some(finalized) => {
                for open in &finalized.withdrawn {
                    self.advance_reviewer(open.reviewer_id, open.channel_id, open.message_ref.as_ref())
                        .await;
                }
                if let Some(path) = &self.settings.training_export {
                    if let Err(e) = append_training_row(path, &finalized.decision).await {
                        warn!(review_item_id, error = %e, "Training export failed");
                    }
                }
                Some(finalized.decision)
            }
            None => None,
        };

        self.enqueue(Job::UpdateStats).await;
        self.fill_empty_queues_locked().await?;
        Ok(decision)
    }

    /// Pull an item out of review for redaction
    ///
    /// Only a reviewer currently holding the item may request it; anything
    /// else is a stale request and yields `None`. Every reviewer who held the
    /// item moves on to their next one.
    pub async fn handle_sanitize_request(
        &self,
        review_item_id: i64,
        reviewer_id: i64,
    ) -> Result<Option<Vec<ActiveAssignment>>> {
        let _section = self.section.lock().await;

        let holds_item = assignments::active_assignment_for(&self.db, reviewer_id)
            .await?
            .is_some_and(|open| open.review_item_id == review_item_id);
        if !holds_item {
            debug!(review_item_id, reviewer_id, "Stale sanitize request ignored");
            return Ok(None);
        }

        let affected = self.request_sanitize(review_item_id).await?;
        for open in &affected {
            self.advance_reviewer(open.reviewer_id, open.channel_id, open.message_ref.as_ref())
                .await;
        }
        self.fill_empty_queues_locked().await?;

        info!(review_item_id, reviewer_id, "Item sent to sanitize desk");
        Ok(Some(affected))
    }
}
