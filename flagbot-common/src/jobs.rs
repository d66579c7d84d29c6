//! Durable FIFO job queue
//!
//! The review service pushes side effects that need a rate-limited external
//! identity; whichever worker currently holds a lease pops and runs them.
//! Pop is a single `DELETE ... RETURNING` statement, so two workers can never
//! receive the same job.

use crate::db::models::ExternalRef;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::debug;

/// A unit of work for the worker fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Job {
    /// Best-effort removal of reviewer reactions from a view
    DeleteReactions {
        channel_id: i64,
        message_ref: ExternalRef,
        emoji: String,
    },

    /// Recompute aggregate counts, deviance and trust, then publish a summary
    UpdateStats,
}

impl Job {
    /// Method name stored alongside the payload
    pub fn method(&self) -> &'static str {
        match self {
            Job::DeleteReactions { .. } => "delete_reactions",
            Job::UpdateStats => "update_stats",
        }
    }
}

/// A job as stored; decoding is deferred so a bad payload cannot wedge a pop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub id: i64,
    pub method: String,
    pub payload: String,
}

impl QueuedJob {
    pub fn decode(&self) -> Result<Job> {
        serde_json::from_str(&self.payload).map_err(Error::from)
    }
}

/// Append a job to the tail of the queue
pub async fn push_job(db: &Pool<Sqlite>, job: &Job) -> Result<i64> {
    let payload = serde_json::to_string(job)?;
    let id = sqlx::query("INSERT INTO job_queue (method, payload) VALUES (?, ?)")
        .bind(job.method())
        .bind(payload)
        .execute(db)
        .await?
        .last_insert_rowid();

    debug!(job_id = id, method = job.method(), "Job enqueued");
    Ok(id)
}

/// Remove and return the head of the queue, if any
pub async fn pop_job(db: &Pool<Sqlite>) -> Result<Option<QueuedJob>> {
    let row = sqlx::query_as::<_, (i64, String, String)>(
        r#"
        DELETE FROM job_queue
        WHERE id = (SELECT MIN(id) FROM job_queue)
        RETURNING id, method, payload
        "#,
    )
    .fetch_optional(db)
    .await?;

    Ok(row.map(|(id, method, payload)| QueuedJob { id, method, payload }))
}

/// Wait until a job is available, polling at `poll_interval`
pub async fn pop_job_blocking(db: &Pool<Sqlite>, poll_interval: Duration) -> Result<QueuedJob> {
    loop {
        if let Some(job) = pop_job(db).await? {
            return Ok(job);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Number of jobs waiting
pub async fn queue_len(db: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM job_queue")
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
        let db = init_database(&dir.path().join("jobs.db")).await.unwrap();
        (dir, db)
    }

    fn delete_job(emoji: &str) -> Job {
        Job::DeleteReactions {
            channel_id: 7,
            message_ref: ExternalRef("msg-1".to_string()),
            emoji: emoji.to_string(),
        }
    }

    #[test]
    fn test_job_payload_is_tagged_by_method() {
        let json = serde_json::to_value(delete_job("x")).unwrap();
        assert_eq!(json["method"], "delete_reactions");
        assert_eq!(json["message_ref"], "msg-1");

        let json = serde_json::to_value(Job::UpdateStats).unwrap();
        assert_eq!(json["method"], "update_stats");
    }

    #[tokio::test]
    async fn test_pop_preserves_fifo_order() {
        let (_dir, db) = setup_test_db().await;

        push_job(&db, &delete_job("a")).await.unwrap();
        push_job(&db, &Job::UpdateStats).await.unwrap();
        push_job(&db, &delete_job("b")).await.unwrap();
        assert_eq!(queue_len(&db).await.unwrap(), 3);

        assert_eq!(pop_job(&db).await.unwrap().unwrap().decode().unwrap(), delete_job("a"));
        assert_eq!(pop_job(&db).await.unwrap().unwrap().decode().unwrap(), Job::UpdateStats);
        assert_eq!(pop_job(&db).await.unwrap().unwrap().decode().unwrap(), delete_job("b"));
        assert!(pop_job(&db).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_payload_still_pops() {
        let (_dir, db) = setup_test_db().await;

        sqlx::query("INSERT INTO job_queue (method, payload) VALUES ('mystery', '{not json')")
            .execute(&db)
            .await
            .unwrap();

        let job = pop_job(&db).await.unwrap().unwrap();
        assert_eq!(job.method, "mystery");
        assert!(job.decode().is_err());
        assert_eq!(queue_len(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_pops_never_share_a_job() {
        let (_dir, db) = setup_test_db().await;
        for i in 0..20 {
            push_job(&db, &delete_job(&i.to_string())).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = pop_job(&db).await.unwrap() {
                    seen.push(job.id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 20);
    }
}
