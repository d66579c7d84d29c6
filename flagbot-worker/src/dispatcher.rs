//! The job drain loop
//!
//! Jobs run one at a time. Whatever a single job does (fail, panic, carry a
//! payload nobody can decode) is logged and the loop moves on.

use flagbot_common::db::ExternalRef;
use flagbot_common::jobs::{pop_job, pop_job_blocking, Job, QueuedJob};
use flagbot_common::Result;
use futures::FutureExt;
use sqlx::SqlitePool;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::reactions::{ReactionApi, REACTION_USER_LIMIT};
use crate::stats::StatsRefresher;

/// What became of one popped job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Payload could not be decoded; the job is dropped
    Undecodable,
    Failed,
    Panicked,
}

pub struct Dispatcher {
    db: SqlitePool,
    reactions: Arc<dyn ReactionApi>,
    review_bot_id: i64,
    stats: StatsRefresher,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        db: SqlitePool,
        reactions: Arc<dyn ReactionApi>,
        review_bot_id: i64,
        stats: StatsRefresher,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            reactions,
            review_bot_id,
            stats,
            poll_interval,
        }
    }

    /// Drain the queue until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Job dispatcher started");
        loop {
            let queued = tokio::select! {
                popped = pop_job_blocking(&self.db, self.poll_interval) => popped,
                _ = shutdown.changed() => break,
            };

            match queued {
                Ok(queued) => {
                    self.process(queued).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to pop job, backing off");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }
        info!("Job dispatcher stopped");
    }

    /// Pop and process one job without waiting; `None` if the queue is empty
    pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
        match pop_job(&self.db).await? {
            Some(queued) => Ok(Some(self.process(queued).await)),
            None => Ok(None),
        }
    }

    pub async fn process(&self, queued: QueuedJob) -> JobOutcome {
        let job = match queued.decode() {
            Ok(job) => job,
            Err(e) => {
                error!(
                    job_id = queued.id,
                    method = %queued.method,
                    error = %e,
                    "Dropping undecodable job"
                );
                return JobOutcome::Undecodable;
            }
        };

        info!(job_id = queued.id, method = job.method(), "Running job");
        match AssertUnwindSafe(self.run_job(&job)).catch_unwind().await {
            Ok(Ok(())) => JobOutcome::Done,
            Ok(Err(e)) => {
                error!(job_id = queued.id, method = job.method(), error = %e, "Job failed");
                JobOutcome::Failed
            }
            Err(_) => {
                error!(job_id = queued.id, method = job.method(), "Job panicked");
                JobOutcome::Panicked
            }
        }
    }

    async fn run_job(&self, job: &Job) -> Result<()> {
        match job {
            Job::DeleteReactions {
                channel_id,
                message_ref,
                emoji,
            } => {
                self.delete_reactions(*channel_id, message_ref, emoji).await;
                Ok(())
            }
            Job::UpdateStats => self.stats.refresh().await.map(|_| ()),
        }
    }

    /// Best effort: any error ends the job quietly, nothing is retried.
    /// The review bot's own reactions are the voting buttons and stay.
    async fn delete_reactions(&self, channel_id: i64, message_ref: &ExternalRef, emoji: &str) {
        let users = match self
            .reactions
            .reaction_users(channel_id, message_ref, emoji, REACTION_USER_LIMIT)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                debug!(channel_id, message = %message_ref, error = %e, "Reaction lookup failed");
                return;
            }
        };

        for user_id in users.into_iter().filter(|id| *id != self.review_bot_id) {
            if let Err(e) = self
                .reactions
                .remove_reaction(channel_id, message_ref, emoji, user_id)
                .await
            {
                debug!(channel_id, message = %message_ref, user_id, error = %e, "Reaction removal failed");
                return;
            }
        }
    }
}
