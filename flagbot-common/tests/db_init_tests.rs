//! Integration tests for database initialization

use flagbot_common::db::init::{init_database, SCHEMA_VERSION};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("flagbot.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("flagbot.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    // Every process runs init on startup; the second run must be a no-op
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("flagbot.db")).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "assignment_votes",
        "infractions",
        "item_scores",
        "job_queue",
        "presentation_refs",
        "review_assignments",
        "review_decisions",
        "review_items",
        "reviewers",
        "schema_version",
        "scored_items",
        "worker_leases",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_single_active_assignment_per_reviewer_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("flagbot.db")).await.unwrap();

    sqlx::query("INSERT INTO reviewers (user_id, channel_id) VALUES (1, 10)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO scored_items (content) VALUES ('a'), ('b')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO review_items (scored_item_id, clean_content) VALUES (1, 'a'), (2, 'b')")
        .execute(&pool)
        .await
        .unwrap();

    sqlx::query("INSERT INTO review_assignments (review_item_id, reviewer_id) VALUES (1, 1)")
        .execute(&pool)
        .await
        .unwrap();
    let second = sqlx::query("INSERT INTO review_assignments (review_item_id, reviewer_id) VALUES (2, 1)")
        .execute(&pool)
        .await;
    assert!(second.is_err(), "second open assignment must be rejected");

    // A closed assignment does not block a new one
    sqlx::query("UPDATE review_assignments SET active = 0")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO review_assignments (review_item_id, reviewer_id) VALUES (2, 1)")
        .execute(&pool)
        .await
        .unwrap();
}
