//! Database initialization
//!
//! One SQLite file is shared by the review service and every worker process.
//! WAL mode allows concurrent readers alongside the single writer; the busy
//! timeout makes competing writers wait instead of failing.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Idempotent - safe to call from every process on startup
    create_schema_version_table(&pool).await?;
    create_scored_items_tables(&pool).await?;
    create_review_items_table(&pool).await?;
    create_reviewers_table(&pool).await?;
    create_review_assignments_tables(&pool).await?;
    create_review_decisions_table(&pool).await?;
    create_infractions_table(&pool).await?;
    create_job_queue_table(&pool).await?;
    create_worker_leases_table(&pool).await?;
    create_presentation_refs_table(&pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&pool)
        .await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Classified content and its append-only score vector
async fn create_scored_items_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scored_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_scores (
            scored_item_id INTEGER NOT NULL REFERENCES scored_items(id) ON DELETE CASCADE,
            category TEXT NOT NULL,
            score REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
            PRIMARY KEY (scored_item_id, category)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Review queue entries; `id` order is creation order
async fn create_review_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scored_item_id INTEGER NOT NULL REFERENCES scored_items(id),
            clean_content TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            in_sanitize INTEGER NOT NULL DEFAULT 0,
            sanitize_requested_at INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_review_items_eligible ON review_items(active, in_sanitize, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_reviewers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviewers (
            user_id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            trusted INTEGER NOT NULL DEFAULT 0,
            date_created TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// The review log: one row per (item, reviewer) pair, plus the cast votes
async fn create_review_assignments_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_assignments (
            review_item_id INTEGER NOT NULL REFERENCES review_items(id),
            reviewer_id INTEGER NOT NULL REFERENCES reviewers(user_id),
            message_ref TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            assigned_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            voted_at TIMESTAMP,
            PRIMARY KEY (review_item_id, reviewer_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-item focus: at most one open assignment per reviewer
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_one_active
        ON review_assignments(reviewer_id) WHERE active = 1
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignment_votes (
            review_item_id INTEGER NOT NULL,
            reviewer_id INTEGER NOT NULL,
            category TEXT NOT NULL,
            vote INTEGER NOT NULL CHECK (vote IN (0, 1)),
            PRIMARY KEY (review_item_id, reviewer_id, category),
            FOREIGN KEY (review_item_id, reviewer_id)
                REFERENCES review_assignments(review_item_id, reviewer_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_review_decisions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_decisions (
            review_item_id INTEGER NOT NULL REFERENCES review_items(id),
            category TEXT NOT NULL,
            outcome INTEGER NOT NULL CHECK (outcome IN (0, 1)),
            decided_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (review_item_id, category)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_infractions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS infractions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            review_item_id INTEGER NOT NULL REFERENCES review_items(id),
            category TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Durable FIFO job list drained by the worker fleet
async fn create_job_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            method TEXT NOT NULL,
            payload TEXT NOT NULL,
            enqueued_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One lease row per identity slot; a slot is free once `expires_at_ms` passes
async fn create_worker_leases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS worker_leases (
            slot INTEGER PRIMARY KEY,
            holder TEXT NOT NULL,
            expires_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_presentation_refs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS presentation_refs (
            name TEXT PRIMARY KEY,
            external_ref TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
