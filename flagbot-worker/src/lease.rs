//! Time-boxed leases on worker identity slots
//!
//! A lease row is free once `expires_at_ms` has passed. Claiming is a single
//! upsert that only overwrites an expired row, so of two racing claimants
//! exactly one sees its row written.

use chrono::Utc;
use flagbot_common::Result;
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::debug;

/// Milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct LeaseStore {
    db: Pool<Sqlite>,
}

impl LeaseStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Claim `slot` for `holder` unless someone else holds a live lease
    pub async fn try_claim(&self, slot: u32, holder: &str, ttl: Duration) -> Result<bool> {
        self.try_claim_at(slot, holder, ttl, now_ms()).await
    }

    pub(crate) async fn try_claim_at(
        &self,
        slot: u32,
        holder: &str,
        ttl: Duration,
        now_ms: i64,
    ) -> Result<bool> {
        let expires_at_ms = now_ms + ttl.as_millis() as i64;
        let result = sqlx::query(
            r#"
            INSERT INTO worker_leases (slot, holder, expires_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                holder = excluded.holder,
                expires_at_ms = excluded.expires_at_ms
            WHERE worker_leases.expires_at_ms <= ?
            "#,
        )
        .bind(i64::from(slot))
        .bind(holder)
        .bind(expires_at_ms)
        .bind(now_ms)
        .execute(&self.db)
        .await?;

        let claimed = result.rows_affected() == 1;
        debug!(slot, claimed, "Lease claim attempted");
        Ok(claimed)
    }

    /// Extend a lease this holder still owns, or re-take it if it lapsed
    ///
    /// Returns `false` when another holder owns a live lease on the slot.
    pub async fn renew(&self, slot: u32, holder: &str, ttl: Duration) -> Result<bool> {
        let now_ms = now_ms();
        let expires_at_ms = now_ms + ttl.as_millis() as i64;
        let result = sqlx::query(
            r#"
            INSERT INTO worker_leases (slot, holder, expires_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                holder = excluded.holder,
                expires_at_ms = excluded.expires_at_ms
            WHERE worker_leases.holder = excluded.holder
               OR worker_leases.expires_at_ms <= ?
            "#,
        )
        .bind(i64::from(slot))
        .bind(holder)
        .bind(expires_at_ms)
        .bind(now_ms)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Give a slot back early; a no-op if the holder no longer owns it
    pub async fn release(&self, slot: u32, holder: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM worker_leases WHERE slot = ? AND holder = ?")
            .bind(i64::from(slot))
            .bind(holder)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Current live holder of a slot, if any
    pub async fn holder_of(&self, slot: u32) -> Result<Option<String>> {
        let holder = sqlx::query_scalar::<_, String>(
            "SELECT holder FROM worker_leases WHERE slot = ? AND expires_at_ms > ?",
        )
        .bind(i64::from(slot))
        .bind(now_ms())
        .fetch_optional(&self.db)
        .await?;

        Ok(holder)
    }
}
