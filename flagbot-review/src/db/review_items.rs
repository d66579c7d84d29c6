//! Review item queries
//!
//! Eligibility for assignment is always computed from the store: an item is
//! poppable while it is active, outside the sanitize detour, and still short
//! of quorum.

use flagbot_common::config::SanitizeOrder;
use flagbot_common::db::ReviewItem;
use flagbot_common::Result;
use sqlx::{Pool, Sqlite};

const ITEM_COLUMNS: &str = "id, scored_item_id, clean_content, active, in_sanitize";

/// Queue a new item (`active = 1, in_sanitize = 0`)
pub async fn insert_review_item(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    scored_item_id: i64,
    clean_content: &str,
) -> Result<i64> {
    let id = sqlx::query("INSERT INTO review_items (scored_item_id, clean_content) VALUES (?, ?)")
        .bind(scored_item_id)
        .bind(clean_content)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

    Ok(id)
}

pub async fn get_review_item(db: &Pool<Sqlite>, id: i64) -> Result<Option<ReviewItem>> {
    let item = sqlx::query_as::<_, ReviewItem>(&format!(
        "SELECT {} FROM review_items WHERE id = ?",
        ITEM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;

    Ok(item)
}

/// Oldest assignable item this reviewer has never been given
pub async fn pop_next_reviewable(
    db: &Pool<Sqlite>,
    reviewer_id: i64,
    min_votes: u32,
) -> Result<Option<ReviewItem>> {
    let item = sqlx::query_as::<_, ReviewItem>(
        r#"
        SELECT r.id, r.scored_item_id, r.clean_content, r.active, r.in_sanitize
        FROM review_items r
        WHERE r.active = 1
          AND r.in_sanitize = 0
          AND NOT EXISTS (
              SELECT 1 FROM review_assignments a
              WHERE a.review_item_id = r.id AND a.reviewer_id = ?
          )
          AND (
              SELECT COUNT(*) FROM review_assignments a
              WHERE a.review_item_id = r.id AND a.voted_at IS NOT NULL
          ) < ?
        ORDER BY r.id
        LIMIT 1
        "#,
    )
    .bind(reviewer_id)
    .bind(i64::from(min_votes))
    .fetch_optional(db)
    .await?;

    Ok(item)
}

/// Number of votes cast on an item
pub async fn cast_vote_count(db: &Pool<Sqlite>, review_item_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM review_assignments WHERE review_item_id = ? AND voted_at IS NOT NULL",
    )
    .bind(review_item_id)
    .fetch_one(db)
    .await?;

    Ok(count)
}

/// Deactivate an item; returns false if it was already inactive
pub async fn deactivate(tx: &mut sqlx::Transaction<'_, Sqlite>, review_item_id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE review_items SET active = 0 WHERE id = ? AND active = 1")
        .bind(review_item_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Park an active item in the sanitize detour; false if it is not eligible
pub async fn mark_in_sanitize(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    review_item_id: i64,
    requested_at_ms: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE review_items
        SET in_sanitize = 1, sanitize_requested_at = ?
        WHERE id = ? AND active = 1 AND in_sanitize = 0
        "#,
    )
    .bind(requested_at_ms)
    .bind(review_item_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Commit sanitized content and return the item to the review queue
pub async fn release_from_sanitize(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    review_item_id: i64,
    clean_content: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE review_items
        SET clean_content = ?, in_sanitize = 0, sanitize_requested_at = NULL
        WHERE id = ? AND active = 1 AND in_sanitize = 1
        "#,
    )
    .bind(clean_content)
    .bind(review_item_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Drop an item from the sanitize detour for good
///
/// `in_sanitize` stays set so the item never counts as a completed review.
pub async fn drop_from_sanitize(db: &Pool<Sqlite>, review_item_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE review_items SET active = 0 WHERE id = ? AND active = 1 AND in_sanitize = 1",
    )
    .bind(review_item_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Next item waiting for the sanitize desk
pub async fn next_pending_sanitize(
    db: &Pool<Sqlite>,
    order: SanitizeOrder,
) -> Result<Option<ReviewItem>> {
    let direction = match order {
        SanitizeOrder::Fifo => "ASC",
        SanitizeOrder::Lifo => "DESC",
    };

    let item = sqlx::query_as::<_, ReviewItem>(&format!(
        r#"
        SELECT {}
        FROM review_items
        WHERE active = 1 AND in_sanitize = 1
        ORDER BY sanitize_requested_at {dir}, id {dir}
        LIMIT 1
        "#,
        ITEM_COLUMNS,
        dir = direction
    ))
    .fetch_optional(db)
    .await?;

    Ok(item)
}

/// Items parked in the sanitize detour
pub async fn pending_sanitize_count(db: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM review_items WHERE active = 1 AND in_sanitize = 1",
    )
    .fetch_one(db)
    .await?;

    Ok(count)
}
