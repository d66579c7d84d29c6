//! The `update_stats` job: recompute, re-evaluate trust, publish a summary
//!
//! The summary lives in one long-lived view whose handle is stored under
//! [`STATS_MESSAGE`], so every worker edits the same view.

use flagbot_common::config::TrustedReviewerConfig;
use flagbot_common::db::refs::{clear_ref, get_ref, set_ref, STATS_MESSAGE};
use flagbot_common::db::ExternalRef;
use flagbot_common::deviance::{
    completed_reviews_total, deviance_for_active, refresh_trust, remaining_for,
};
use flagbot_common::presenter::Presenter;
use flagbot_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::retry::{retry_transient, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewerStats {
    pub user_id: i64,
    pub completed: i64,
    pub remaining: i64,
    pub deviance: i64,
    pub trusted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    /// Largest backlog any single reviewer still has
    pub remaining: i64,
    /// Items finalized through review
    pub completed: i64,
    pub reviewers: Vec<ReviewerStats>,
}

impl StatsSummary {
    pub fn render(&self) -> String {
        let mut text = format!(
            "Reviewer Stats\n\nReviews Left: {}\nReviews Completed: {}",
            self.remaining, self.completed
        );
        for r in &self.reviewers {
            let _ = write!(
                text,
                "\n\nReviewer {}{}\nReviews Left: {}\nReviews Completed: {}\nDeviance Score: {}",
                r.user_id,
                if r.trusted { " (trusted)" } else { "" },
                r.remaining,
                r.completed,
                r.deviance
            );
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Last refresh is younger than the cooldown
    Skipped,
    Refreshed {
        summary: StatsSummary,
        /// Where the summary was published, if anywhere
        view: Option<ExternalRef>,
    },
}

#[derive(Debug, Clone)]
pub struct StatsSettings {
    pub stats_channel: Option<i64>,
    pub min_votes: u32,
    pub thresholds: TrustedReviewerConfig,
    pub cooldown: Duration,
    pub retry: RetryPolicy,
}

pub struct StatsRefresher {
    db: SqlitePool,
    presenter: Arc<dyn Presenter>,
    settings: StatsSettings,
    last_refresh: Mutex<Option<Instant>>,
}

impl StatsRefresher {
    pub fn new(db: SqlitePool, presenter: Arc<dyn Presenter>, settings: StatsSettings) -> Self {
        Self {
            db,
            presenter,
            settings,
            last_refresh: Mutex::new(None),
        }
    }

    /// Aggregate counts and per-reviewer deviance; also persists trust changes
    pub async fn compute(&self) -> Result<StatsSummary> {
        let changes = refresh_trust(&self.db, &self.settings.thresholds).await?;
        if !changes.promoted.is_empty() || !changes.demoted.is_empty() {
            info!(promoted = ?changes.promoted, demoted = ?changes.demoted, "Trust updated");
        }

        let mut reviewers = Vec::new();
        for report in deviance_for_active(&self.db).await? {
            let remaining =
                remaining_for(&self.db, report.reviewer_id, self.settings.min_votes).await?;
            reviewers.push(ReviewerStats {
                user_id: report.reviewer_id,
                completed: report.completed,
                remaining,
                deviance: report.total,
                trusted: report.is_trusted(&self.settings.thresholds),
            });
        }

        Ok(StatsSummary {
            remaining: reviewers.iter().map(|r| r.remaining).max().unwrap_or(0),
            completed: completed_reviews_total(&self.db).await?,
            reviewers,
        })
    }

    /// Recompute and publish, unless the cooldown has not elapsed
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let mut last_refresh = self.last_refresh.lock().await;
        if let Some(last) = *last_refresh {
            if last.elapsed() < self.settings.cooldown {
                info!("Skipping stats, refreshed recently");
                return Ok(RefreshOutcome::Skipped);
            }
        }

        let summary = self.compute().await?;
        let view = self.publish(&summary.render()).await?;
        *last_refresh = Some(Instant::now());

        debug!(
            completed = summary.completed,
            remaining = summary.remaining,
            "Stats refreshed"
        );
        Ok(RefreshOutcome::Refreshed { summary, view })
    }

    /// Edit the stored summary view, or send a new one if it is gone
    async fn publish(&self, content: &str) -> Result<Option<ExternalRef>> {
        let policy = self.settings.retry;

        if let Some(view) = get_ref(&self.db, STATS_MESSAGE).await? {
            let edited = retry_transient("stats edit", policy, || {
                self.presenter.edit_by_ref(&view, content, None)
            })
            .await;
            match edited {
                Ok(()) => return Ok(Some(view)),
                Err(Error::NotFound(_)) => {
                    info!(view = %view, "Stats view vanished, sending a new one");
                    clear_ref(&self.db, STATS_MESSAGE).await?;
                }
                Err(e) => return Err(e),
            }
        }

        let Some(channel_id) = self.settings.stats_channel else {
            debug!("No stats channel configured, summary not published");
            return Ok(None);
        };

        let view = retry_transient("stats send", policy, || {
            self.presenter.render_and_send(channel_id, content, None)
        })
        .await?;
        set_ref(&self.db, STATS_MESSAGE, &view).await?;
        Ok(Some(view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_each_reviewer() {
        let summary = StatsSummary {
            remaining: 4,
            completed: 12,
            reviewers: vec![
                ReviewerStats {
                    user_id: 1,
                    completed: 10,
                    remaining: 4,
                    deviance: 150,
                    trusted: true,
                },
                ReviewerStats {
                    user_id: 2,
                    completed: 2,
                    remaining: 0,
                    deviance: 900,
                    trusted: false,
                },
            ],
        };

        let text = summary.render();
        assert!(text.starts_with("Reviewer Stats\n\nReviews Left: 4\nReviews Completed: 12"));
        assert!(text.contains("Reviewer 1 (trusted)\nReviews Left: 4"));
        assert!(text.contains("Reviewer 2\nReviews Left: 0\nReviews Completed: 2\nDeviance Score: 900"));
    }
}
