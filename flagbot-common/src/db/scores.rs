//! Score Store: classified content and its score vector
//!
//! Rows are append-only. A scored item is written once, together with its
//! scores, and never updated.

use crate::categories::{validate_scores, ScoreVector};
use crate::db::models::ScoredItem;
use crate::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Persist content and its scores inside the caller's transaction
pub async fn insert_scored_item(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    content: &str,
    scores: &ScoreVector,
) -> Result<i64> {
    validate_scores(scores)?;

    let id = sqlx::query("INSERT INTO scored_items (content) VALUES (?)")
        .bind(content)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

    for (category, score) in scores {
        sqlx::query(
            "INSERT INTO item_scores (scored_item_id, category, score) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(category.as_str())
        .bind(score)
        .execute(&mut **tx)
        .await?;
    }

    Ok(id)
}

/// Load a scored item with its scores
pub async fn get_scored_item(db: &Pool<Sqlite>, id: i64) -> Result<ScoredItem> {
    let content = sqlx::query_scalar::<_, String>("SELECT content FROM scored_items WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Scored item {}", id)))?;

    Ok(ScoredItem {
        id,
        content,
        scores: get_scores(db, id).await?,
    })
}

/// Scores recorded for a scored item
pub async fn get_scores(db: &Pool<Sqlite>, scored_item_id: i64) -> Result<ScoreVector> {
    let rows = sqlx::query_as::<_, (String, f64)>(
        "SELECT category, score FROM item_scores WHERE scored_item_id = ?",
    )
    .bind(scored_item_id)
    .fetch_all(db)
    .await?;

    rows.into_iter()
        .map(|(category, score)| Ok((category.parse()?, score)))
        .collect()
}
