//! Reviewer deviance and trust
//!
//! Deviance measures how often a reviewer's votes disagree with the decision
//! that was finally taken. Only finalized items count, and only votes that
//! were actually cast (assignments closed by finalize carry no votes).

use crate::categories::Category;
use crate::config::TrustedReviewerConfig;
use crate::Result;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Deviance of one reviewer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevianceReport {
    pub reviewer_id: i64,

    /// Number of finalized items this reviewer voted on
    pub completed: i64,

    /// Disagreement rate per category, rounded to 3 decimals
    pub per_category: BTreeMap<Category, f64>,

    /// Sum of the per-category rates, scaled by 1000
    pub total: i64,
}

impl DevianceReport {
    /// Trusted iff enough completed reviews and low enough total deviance
    pub fn is_trusted(&self, thresholds: &TrustedReviewerConfig) -> bool {
        self.completed > thresholds.min_reviews && self.total < thresholds.max_deviance
    }
}

/// Result of a trust refresh pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustChanges {
    pub promoted: Vec<i64>,
    pub demoted: Vec<i64>,
}

/// Compute deviance for one reviewer
pub async fn deviance_for(db: &Pool<Sqlite>, reviewer_id: i64) -> Result<DevianceReport> {
    let completed = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM review_assignments a
        JOIN review_items i ON i.id = a.review_item_id
        WHERE a.reviewer_id = ?
          AND a.voted_at IS NOT NULL
          AND i.active = 0
          AND EXISTS (SELECT 1 FROM review_decisions d WHERE d.review_item_id = a.review_item_id)
        "#,
    )
    .bind(reviewer_id)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, (String, f64)>(
        r#"
        SELECT v.category,
               ROUND(AVG(CASE WHEN v.vote = d.outcome THEN 0.0 ELSE 1.0 END), 3)
        FROM assignment_votes v
        JOIN review_assignments a
          ON a.review_item_id = v.review_item_id AND a.reviewer_id = v.reviewer_id
        JOIN review_decisions d
          ON d.review_item_id = v.review_item_id AND d.category = v.category
        JOIN review_items i ON i.id = v.review_item_id
        WHERE v.reviewer_id = ?
          AND a.voted_at IS NOT NULL
          AND i.active = 0
        GROUP BY v.category
        "#,
    )
    .bind(reviewer_id)
    .fetch_all(db)
    .await?;

    let mut per_category: BTreeMap<Category, f64> =
        Category::ALL.iter().map(|c| (*c, 0.0)).collect();
    for (category, rate) in rows {
        per_category.insert(category.parse()?, rate);
    }

    let sum: f64 = per_category.values().sum();
    let total = (sum * 1000.0).round() as i64;

    Ok(DevianceReport {
        reviewer_id,
        completed,
        per_category,
        total,
    })
}

/// Compute deviance for every active reviewer, ordered by user id
pub async fn deviance_for_active(db: &Pool<Sqlite>) -> Result<Vec<DevianceReport>> {
    let reviewer_ids = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM reviewers WHERE active = 1 ORDER BY user_id",
    )
    .fetch_all(db)
    .await?;

    let mut reports = Vec::with_capacity(reviewer_ids.len());
    for reviewer_id in reviewer_ids {
        reports.push(deviance_for(db, reviewer_id).await?);
    }
    Ok(reports)
}

/// Recompute and persist the `trusted` flag of every active reviewer
///
/// Promotion and demotion use the same predicate, so a reviewer whose
/// deviance drifts upward loses trust on the next refresh.
pub async fn refresh_trust(
    db: &Pool<Sqlite>,
    thresholds: &TrustedReviewerConfig,
) -> Result<TrustChanges> {
    let current: BTreeMap<i64, bool> = sqlx::query_as::<_, (i64, bool)>(
        "SELECT user_id, trusted FROM reviewers WHERE active = 1",
    )
    .fetch_all(db)
    .await?
    .into_iter()
    .collect();

    let mut changes = TrustChanges::default();

    for report in deviance_for_active(db).await? {
        let trusted = report.is_trusted(thresholds);
        let was_trusted = current.get(&report.reviewer_id).copied().unwrap_or(false);
        if trusted == was_trusted {
            continue;
        }

        sqlx::query("UPDATE reviewers SET trusted = ? WHERE user_id = ?")
            .bind(trusted)
            .bind(report.reviewer_id)
            .execute(db)
            .await?;

        if trusted {
            info!(
                reviewer_id = report.reviewer_id,
                completed = report.completed,
                deviance = report.total,
                "Reviewer promoted to trusted"
            );
            changes.promoted.push(report.reviewer_id);
        } else {
            info!(
                reviewer_id = report.reviewer_id,
                completed = report.completed,
                deviance = report.total,
                "Reviewer trust revoked"
            );
            changes.demoted.push(report.reviewer_id);
        }
    }

    debug!(
        promoted = changes.promoted.len(),
        demoted = changes.demoted.len(),
        "Trust refresh complete"
    );
    Ok(changes)
}

/// Number of items that reached a decision
///
/// Items dropped from the sanitize desk stay flagged `in_sanitize` and are
/// therefore not counted.
pub async fn completed_reviews_total(db: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM review_items WHERE active = 0 AND in_sanitize = 0",
    )
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Number of open items this reviewer could still be asked to vote on
pub async fn remaining_for(db: &Pool<Sqlite>, reviewer_id: i64, min_votes: u32) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM review_items r
        WHERE r.active = 1
          AND r.in_sanitize = 0
          AND NOT EXISTS (
              SELECT 1 FROM review_assignments a
              WHERE a.review_item_id = r.id
                AND a.reviewer_id = ?
                AND a.voted_at IS NOT NULL
          )
          AND (
              SELECT COUNT(*) FROM review_assignments a
              WHERE a.review_item_id = r.id AND a.voted_at IS NOT NULL
          ) < ?
        "#,
    )
    .bind(reviewer_id)
    .bind(i64::from(min_votes))
    .fetch_one(db)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_database;

    async fn setup_test_db() -> (tempfile::TempDir, Pool<Sqlite>) {
        let dir = tempfile::tempdir().unwrap();
        let db = init_database(&dir.path().join("deviance.db")).await.unwrap();
        (dir, db)
    }

    async fn add_reviewer(db: &Pool<Sqlite>, user_id: i64) {
        sqlx::query("INSERT INTO reviewers (user_id, channel_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(user_id * 10)
            .execute(db)
            .await
            .unwrap();
    }

    async fn add_item(db: &Pool<Sqlite>, active: bool) -> i64 {
        let scored = sqlx::query("INSERT INTO scored_items (content) VALUES ('text')")
            .execute(db)
            .await
            .unwrap()
            .last_insert_rowid();
        sqlx::query("INSERT INTO review_items (scored_item_id, clean_content, active) VALUES (?, 'text', ?)")
            .bind(scored)
            .bind(active)
            .execute(db)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    /// Record a cast vote with `insult = vote` and every other category 0
    async fn cast(db: &Pool<Sqlite>, item: i64, reviewer: i64, insult: i64) {
        sqlx::query(
            "INSERT INTO review_assignments (review_item_id, reviewer_id, active, voted_at) VALUES (?, ?, 0, CURRENT_TIMESTAMP)",
        )
        .bind(item)
        .bind(reviewer)
        .execute(db)
        .await
        .unwrap();
        for category in Category::ALL {
            let vote = if category == Category::Insult { insult } else { 0 };
            sqlx::query("INSERT INTO assignment_votes VALUES (?, ?, ?, ?)")
                .bind(item)
                .bind(reviewer)
                .bind(category.as_str())
                .bind(vote)
                .execute(db)
                .await
                .unwrap();
        }
    }

    async fn decide(db: &Pool<Sqlite>, item: i64, insult: i64) {
        for category in Category::ALL {
            let outcome = if category == Category::Insult { insult } else { 0 };
            sqlx::query("INSERT INTO review_decisions (review_item_id, category, outcome) VALUES (?, ?, ?)")
                .bind(item)
                .bind(category.as_str())
                .bind(outcome)
                .execute(db)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_deviance_counts_disagreements() {
        let (_dir, db) = setup_test_db().await;
        add_reviewer(&db, 1).await;

        // Three finalized items decided insult=1; reviewer disagreed once
        for vote in [1, 1, 0] {
            let item = add_item(&db, false).await;
            cast(&db, item, 1, vote).await;
            decide(&db, item, 1).await;
        }

        let report = deviance_for(&db, 1).await.unwrap();
        assert_eq!(report.completed, 3);
        assert_eq!(report.per_category[&Category::Insult], 0.333);
        assert_eq!(report.per_category[&Category::Threat], 0.0);
        assert_eq!(report.total, 333);
    }

    #[tokio::test]
    async fn test_unfinalized_items_do_not_count() {
        let (_dir, db) = setup_test_db().await;
        add_reviewer(&db, 1).await;

        let open = add_item(&db, true).await;
        cast(&db, open, 1, 1).await;

        let report = deviance_for(&db, 1).await.unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(report.total, 0);
    }

    #[tokio::test]
    async fn test_trust_promotion_and_demotion() {
        let (_dir, db) = setup_test_db().await;
        add_reviewer(&db, 1).await;
        let thresholds = TrustedReviewerConfig {
            min_reviews: 2,
            max_deviance: 200,
        };

        for _ in 0..3 {
            let item = add_item(&db, false).await;
            cast(&db, item, 1, 1).await;
            decide(&db, item, 1).await;
        }

        let changes = refresh_trust(&db, &thresholds).await.unwrap();
        assert_eq!(changes.promoted, vec![1]);

        // Two disagreements push deviance to 0.4 -> 400
        for _ in 0..2 {
            let item = add_item(&db, false).await;
            cast(&db, item, 1, 0).await;
            decide(&db, item, 1).await;
        }

        let changes = refresh_trust(&db, &thresholds).await.unwrap();
        assert_eq!(changes.demoted, vec![1]);
        let trusted: bool = sqlx::query_scalar("SELECT trusted FROM reviewers WHERE user_id = 1")
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(!trusted);
    }

    #[tokio::test]
    async fn test_completed_and_remaining_counts() {
        let (_dir, db) = setup_test_db().await;
        add_reviewer(&db, 1).await;
        add_reviewer(&db, 2).await;

        let done = add_item(&db, false).await;
        decide(&db, done, 0).await;
        let open_a = add_item(&db, true).await;
        let _open_b = add_item(&db, true).await;
        cast(&db, open_a, 1, 0).await;

        // Dropped from the sanitize desk: inactive but still in_sanitize
        let dropped = add_item(&db, false).await;
        sqlx::query("UPDATE review_items SET in_sanitize = 1 WHERE id = ?")
            .bind(dropped)
            .execute(&db)
            .await
            .unwrap();

        assert_eq!(completed_reviews_total(&db).await.unwrap(), 1);
        assert_eq!(remaining_for(&db, 1, 3).await.unwrap(), 1);
        assert_eq!(remaining_for(&db, 2, 3).await.unwrap(), 2);
        assert_eq!(remaining_for(&db, 2, 1).await.unwrap(), 1);
    }
}
