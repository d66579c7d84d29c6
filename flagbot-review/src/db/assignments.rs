//! Review log queries: assignments, cast votes and decisions

use flagbot_common::categories::{Category, VoteVector};
use flagbot_common::db::{ActiveAssignment, ExternalRef, ReviewAssignment};
use flagbot_common::Result;
use sqlx::{Pool, Sqlite};

use crate::consensus::decision::CastVote;

/// Open an assignment; the partial unique index rejects a second open one
pub async fn insert_assignment(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    review_item_id: i64,
    reviewer_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO review_assignments (review_item_id, reviewer_id, active) VALUES (?, ?, 1)",
    )
    .bind(review_item_id)
    .bind(reviewer_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// The reviewer's open assignment, if any
pub async fn active_assignment_for(
    db: &Pool<Sqlite>,
    reviewer_id: i64,
) -> Result<Option<ActiveAssignment>> {
    let assignment = sqlx::query_as::<_, ActiveAssignment>(
        r#"
        SELECT a.review_item_id, a.reviewer_id, r.channel_id, a.message_ref
        FROM review_assignments a
        JOIN reviewers r ON r.user_id = a.reviewer_id
        WHERE a.reviewer_id = ? AND a.active = 1
        "#,
    )
    .bind(reviewer_id)
    .fetch_optional(db)
    .await?;

    Ok(assignment)
}

/// Open assignments on an item
pub async fn active_assignments_on(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    review_item_id: i64,
) -> Result<Vec<ActiveAssignment>> {
    let assignments = sqlx::query_as::<_, ActiveAssignment>(
        r#"
        SELECT a.review_item_id, a.reviewer_id, r.channel_id, a.message_ref
        FROM review_assignments a
        JOIN reviewers r ON r.user_id = a.reviewer_id
        WHERE a.review_item_id = ? AND a.active = 1
        ORDER BY a.assigned_at, a.reviewer_id
        "#,
    )
    .bind(review_item_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(assignments)
}

pub async fn set_message_ref(
    db: &Pool<Sqlite>,
    review_item_id: i64,
    reviewer_id: i64,
    message_ref: &ExternalRef,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE review_assignments SET message_ref = ? WHERE review_item_id = ? AND reviewer_id = ?",
    )
    .bind(message_ref.as_str())
    .bind(review_item_id)
    .bind(reviewer_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Close an open assignment with the reviewer's votes
///
/// Returns the view handle of the closed assignment, or `None` when no open
/// assignment matched (a stale vote).
pub async fn close_with_votes(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    review_item_id: i64,
    reviewer_id: i64,
    votes: &VoteVector,
) -> Result<Option<Option<ExternalRef>>> {
    let closed = sqlx::query_scalar::<_, Option<String>>(
        r#"
        UPDATE review_assignments
        SET active = 0, voted_at = CURRENT_TIMESTAMP
        WHERE review_item_id = ? AND reviewer_id = ? AND active = 1
        RETURNING message_ref
        "#,
    )
    .bind(review_item_id)
    .bind(reviewer_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(message_ref) = closed else {
        return Ok(None);
    };

    for (category, vote) in votes {
        sqlx::query(
            r#"
            INSERT INTO assignment_votes (review_item_id, reviewer_id, category, vote)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(review_item_id)
        .bind(reviewer_id)
        .bind(category.as_str())
        .bind(vote)
        .execute(&mut **tx)
        .await?;
    }

    Ok(Some(message_ref.map(ExternalRef)))
}

/// Every vote cast on an item, with the voter's current trust flag
pub async fn cast_votes_on(db: &Pool<Sqlite>, review_item_id: i64) -> Result<Vec<CastVote>> {
    let rows = sqlx::query_as::<_, (i64, bool, String, i64)>(
        r#"
        SELECT a.reviewer_id, r.trusted, v.category, v.vote
        FROM review_assignments a
        JOIN reviewers r ON r.user_id = a.reviewer_id
        JOIN assignment_votes v
          ON v.review_item_id = a.review_item_id AND v.reviewer_id = a.reviewer_id
        WHERE a.review_item_id = ? AND a.voted_at IS NOT NULL
        ORDER BY a.voted_at, a.reviewer_id
        "#,
    )
    .bind(review_item_id)
    .fetch_all(db)
    .await?;

    let mut cast: Vec<(i64, CastVote)> = Vec::new();
    for (reviewer_id, trusted, category, vote) in rows {
        let category: Category = category.parse()?;
        match cast.last_mut() {
            Some((id, entry)) if *id == reviewer_id => {
                entry.votes.insert(category, vote);
            }
            _ => {
                let mut votes = VoteVector::new();
                votes.insert(category, vote);
                cast.push((reviewer_id, CastVote { votes, trusted }));
            }
        }
    }

    Ok(cast.into_iter().map(|(_, vote)| vote).collect())
}

/// Load one row of the review log with its votes
pub async fn get_assignment(
    db: &Pool<Sqlite>,
    review_item_id: i64,
    reviewer_id: i64,
) -> Result<Option<ReviewAssignment>> {
    let assignment = sqlx::query_as::<_, ReviewAssignment>(
        r#"
        SELECT review_item_id, reviewer_id, message_ref, active
        FROM review_assignments
        WHERE review_item_id = ? AND reviewer_id = ?
        "#,
    )
    .bind(review_item_id)
    .bind(reviewer_id)
    .fetch_optional(db)
    .await?;

    let Some(mut assignment) = assignment else {
        return Ok(None);
    };

    let votes = sqlx::query_as::<_, (String, i64)>(
        "SELECT category, vote FROM assignment_votes WHERE review_item_id = ? AND reviewer_id = ?",
    )
    .bind(review_item_id)
    .bind(reviewer_id)
    .fetch_all(db)
    .await?;

    for (category, vote) in votes {
        assignment.votes.insert(category.parse()?, vote);
    }

    Ok(Some(assignment))
}

/// Number of assignment rows on an item, open or closed
pub async fn assignment_count(db: &Pool<Sqlite>, review_item_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM review_assignments WHERE review_item_id = ?",
    )
    .bind(review_item_id)
    .fetch_one(db)
    .await?;

    Ok(count)
}

/// Close every open assignment on an item without recording votes
pub async fn close_all_on(tx: &mut sqlx::Transaction<'_, Sqlite>, review_item_id: i64) -> Result<()> {
    sqlx::query("UPDATE review_assignments SET active = 0 WHERE review_item_id = ? AND active = 1")
        .bind(review_item_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Remove every assignment row (and its votes) for an item
pub async fn delete_all_on(tx: &mut sqlx::Transaction<'_, Sqlite>, review_item_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM review_assignments WHERE review_item_id = ?")
        .bind(review_item_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Withdraw one open assignment; its reviewer was removed, not voting
pub async fn delete_open_assignment(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    reviewer_id: i64,
) -> Result<Option<ExternalRef>> {
    let removed = sqlx::query_scalar::<_, Option<String>>(
        "DELETE FROM review_assignments WHERE reviewer_id = ? AND active = 1 RETURNING message_ref",
    )
    .bind(reviewer_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(removed.flatten().map(ExternalRef))
}

/// Persist the finalized outcome and one infraction per flagged category
pub async fn record_decision(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    review_item_id: i64,
    outcome: &VoteVector,
) -> Result<()> {
    for (category, value) in outcome {
        sqlx::query(
            "INSERT INTO review_decisions (review_item_id, category, outcome) VALUES (?, ?, ?)",
        )
        .bind(review_item_id)
        .bind(category.as_str())
        .bind(value)
        .execute(&mut **tx)
        .await?;

        if *value == 1 {
            sqlx::query("INSERT INTO infractions (review_item_id, category) VALUES (?, ?)")
                .bind(review_item_id)
                .bind(category.as_str())
                .execute(&mut **tx)
                .await?;
        }
    }

    Ok(())
}

/// Finalized outcome of an item, if one was recorded
pub async fn get_decision(db: &Pool<Sqlite>, review_item_id: i64) -> Result<Option<VoteVector>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT category, outcome FROM review_decisions WHERE review_item_id = ?",
    )
    .bind(review_item_id)
    .fetch_all(db)
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let outcome = rows
        .into_iter()
        .map(|(category, value)| Ok((category.parse::<Category>()?, value)))
        .collect::<Result<VoteVector>>()?;
    Ok(Some(outcome))
}
