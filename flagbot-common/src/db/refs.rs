//! Named presentation handles
//!
//! Long-lived rendered views (the stats summary) are edited in place, so the
//! handle must survive restarts and be visible to every worker.

use crate::db::models::ExternalRef;
use crate::Result;
use sqlx::{Pool, Sqlite};

/// Name under which the stats summary view is stored
pub const STATS_MESSAGE: &str = "stats_message";

/// Get a stored handle by name
pub async fn get_ref(db: &Pool<Sqlite>, name: &str) -> Result<Option<ExternalRef>> {
    let value = sqlx::query_scalar::<_, String>(
        "SELECT external_ref FROM presentation_refs WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(db)
    .await?;

    Ok(value.map(ExternalRef))
}

/// Store (or replace) a handle
pub async fn set_ref(db: &Pool<Sqlite>, name: &str, external_ref: &ExternalRef) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO presentation_refs (name, external_ref, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(name) DO UPDATE SET
            external_ref = excluded.external_ref,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(name)
    .bind(external_ref.as_str())
    .execute(db)
    .await?;

    Ok(())
}

/// Forget a handle (e.g. the view was deleted externally)
pub async fn clear_ref(db: &Pool<Sqlite>, name: &str) -> Result<()> {
    sqlx::query("DELETE FROM presentation_refs WHERE name = ?")
        .bind(name)
        .execute(db)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_database;

    #[tokio::test]
    async fn test_set_get_and_replace_ref() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_database(&dir.path().join("refs.db")).await.unwrap();

        assert!(get_ref(&db, STATS_MESSAGE).await.unwrap().is_none());

        set_ref(&db, STATS_MESSAGE, &ExternalRef("m-1".to_string())).await.unwrap();
        set_ref(&db, STATS_MESSAGE, &ExternalRef("m-2".to_string())).await.unwrap();
        assert_eq!(
            get_ref(&db, STATS_MESSAGE).await.unwrap(),
            Some(ExternalRef("m-2".to_string()))
        );

        clear_ref(&db, STATS_MESSAGE).await.unwrap();
        assert!(get_ref(&db, STATS_MESSAGE).await.unwrap().is_none());
    }
}
