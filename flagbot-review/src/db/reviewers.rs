//! Reviewer roster queries

use flagbot_common::db::Reviewer;
use flagbot_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Opt a user in; reactivates a previously removed reviewer
///
/// Fails with `Error::Constraint` if the user is already an active reviewer.
pub async fn add_reviewer(db: &Pool<Sqlite>, user_id: i64, channel_id: i64) -> Result<Reviewer> {
    let result = sqlx::query(
        r#"
        INSERT INTO reviewers (user_id, channel_id, active, trusted)
        VALUES (?, ?, 1, 0)
        ON CONFLICT(user_id) DO UPDATE SET
            active = 1,
            channel_id = excluded.channel_id
        WHERE reviewers.active = 0
        "#,
    )
    .bind(user_id)
    .bind(channel_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Constraint(format!(
            "User {} is already a reviewer",
            user_id
        )));
    }

    get_reviewer(db, user_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Reviewer {} vanished after insert", user_id)))
}

pub async fn get_reviewer(db: &Pool<Sqlite>, user_id: i64) -> Result<Option<Reviewer>> {
    let reviewer = sqlx::query_as::<_, Reviewer>(
        "SELECT user_id, channel_id, active, trusted, date_created FROM reviewers WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    Ok(reviewer)
}

/// Soft-delete a reviewer; false if they were not active
pub async fn deactivate_reviewer(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    user_id: i64,
) -> Result<bool> {
    let result = sqlx::query("UPDATE reviewers SET active = 0 WHERE user_id = ? AND active = 1")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Active reviewers with no open assignment, longest-serving first
pub async fn find_empty_reviewers(db: &Pool<Sqlite>) -> Result<Vec<Reviewer>> {
    let reviewers = sqlx::query_as::<_, Reviewer>(
        r#"
        SELECT r.user_id, r.channel_id, r.active, r.trusted, r.date_created
        FROM reviewers r
        WHERE r.active = 1
          AND NOT EXISTS (
              SELECT 1 FROM review_assignments a
              WHERE a.reviewer_id = r.user_id AND a.active = 1
          )
        ORDER BY r.date_created, r.user_id
        "#,
    )
    .fetch_all(db)
    .await?;

    Ok(reviewers)
}
