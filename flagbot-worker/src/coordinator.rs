//! Claiming and holding one identity slot
//!
//! Every worker process runs the same loop: walk the slots, take the first
//! free one, then keep renewing it in the background. A crashed worker simply
//! stops renewing and its slot frees itself when the lease lapses.

use flagbot_common::config::WorkerConfig;
use flagbot_common::{Error, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::lease::LeaseStore;

/// Where this process stands with respect to its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Unclaimed,
    Claimed { slot: u32 },
    /// Another holder took the slot after our lease lapsed
    Expired { slot: u32 },
}

/// The slot this process won and the credential that comes with it
#[derive(Clone)]
pub struct ClaimedIdentity {
    pub slot: u32,
    pub credential: String,
}

impl std::fmt::Debug for ClaimedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimedIdentity")
            .field("slot", &self.slot)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Lease timings
#[derive(Debug, Clone, Copy)]
pub struct LeaseTimings {
    pub ttl: Duration,
    pub renew_interval: Duration,
    pub claim_backoff: Duration,
}

impl From<&WorkerConfig> for LeaseTimings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            ttl: config.lease_ttl(),
            renew_interval: config.renew_interval(),
            claim_backoff: config.claim_backoff(),
        }
    }
}

pub struct WorkerCoordinator {
    leases: LeaseStore,
    credentials: Vec<String>,
    holder: String,
    timings: LeaseTimings,
    state: watch::Sender<ClaimState>,
}

impl WorkerCoordinator {
    /// One credential per slot; the slot count is `credentials.len()`
    pub fn new(leases: LeaseStore, credentials: Vec<String>, timings: LeaseTimings) -> Self {
        let (state, _) = watch::channel(ClaimState::Unclaimed);
        Self {
            leases,
            credentials,
            holder: format!("worker-{}", Uuid::new_v4()),
            timings,
            state,
        }
    }

    /// Unique token written into every lease this process holds
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn state(&self) -> ClaimState {
        *self.state.borrow()
    }

    /// Try every slot once, in order
    pub async fn try_claim_any(&self) -> Result<Option<ClaimedIdentity>> {
        for (slot, credential) in self.credentials.iter().enumerate() {
            let slot = u32::try_from(slot)
                .map_err(|_| Error::Config(format!("Slot index {} out of range", slot)))?;
            if self.leases.try_claim(slot, &self.holder, self.timings.ttl).await? {
                self.state.send_replace(ClaimState::Claimed { slot });
                info!(slot, holder = %self.holder, "Claimed worker slot");
                return Ok(Some(ClaimedIdentity {
                    slot,
                    credential: credential.clone(),
                }));
            }
        }
        Ok(None)
    }

    /// Claim a slot, retrying after a fixed backoff until one frees up
    pub async fn claim(&self) -> ClaimedIdentity {
        loop {
            match self.try_claim_any().await {
                Ok(Some(identity)) => return identity,
                Ok(None) => warn!(
                    backoff_secs = self.timings.claim_backoff.as_secs(),
                    "Failed to claim a worker slot, retrying"
                ),
                Err(e) => warn!(error = %e, "Slot claim errored, retrying"),
            }
            tokio::time::sleep(self.timings.claim_backoff).await;
        }
    }

    /// Renew the lease once; failures are reported, never fatal
    pub async fn renew_once(&self, slot: u32) -> ClaimState {
        match self.leases.renew(slot, &self.holder, self.timings.ttl).await {
            Ok(true) => {
                self.state.send_replace(ClaimState::Claimed { slot });
            }
            Ok(false) => {
                error!(slot, "Worker slot is held by another process");
                self.state.send_replace(ClaimState::Expired { slot });
            }
            Err(e) => warn!(slot, error = %e, "Failed to renew worker slot, will retry"),
        }
        self.state()
    }

    /// Keep renewing `slot` every `renew_interval` until `shutdown` flips
    pub fn spawn_renewal(
        self: &std::sync::Arc<Self>,
        slot: u32,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.timings.renew_interval);
            // The first tick fires immediately; the claim is fresh
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        coordinator.renew_once(slot).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }

    /// Hand the slot back so another process can take it immediately
    pub async fn release(&self, slot: u32) -> Result<()> {
        if self.leases.release(slot, &self.holder).await? {
            info!(slot, "Released worker slot");
        }
        self.state.send_replace(ClaimState::Unclaimed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagbot_common::db::init_database;
    use tempfile::TempDir;

    fn timings() -> LeaseTimings {
        LeaseTimings {
            ttl: Duration::from_secs(30),
            renew_interval: Duration::from_millis(20),
            claim_backoff: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_claims_first_free_slot_with_its_credential() {
        let dir = TempDir::new().unwrap();
        let db = init_database(&dir.path().join("w.db")).await.unwrap();
        let credentials = vec!["token-0".to_string(), "token-1".to_string()];

        let a = WorkerCoordinator::new(LeaseStore::new(db.clone()), credentials.clone(), timings());
        let b = WorkerCoordinator::new(LeaseStore::new(db.clone()), credentials.clone(), timings());
        let c = WorkerCoordinator::new(LeaseStore::new(db), credentials, timings());

        let first = a.try_claim_any().await.unwrap().unwrap();
        assert_eq!(first.slot, 0);
        assert_eq!(first.credential, "token-0");
        let second = b.try_claim_any().await.unwrap().unwrap();
        assert_eq!(second.slot, 1);
        assert!(c.try_claim_any().await.unwrap().is_none());
        assert_eq!(c.state(), ClaimState::Unclaimed);

        // A released slot is picked up by the waiting process
        a.release(0).await.unwrap();
        let taken = c.claim().await;
        assert_eq!(taken.slot, 0);
        assert_eq!(c.state(), ClaimState::Claimed { slot: 0 });
    }

    #[tokio::test]
    async fn test_renewal_reports_lost_slot() {
        let dir = TempDir::new().unwrap();
        let db = init_database(&dir.path().join("w.db")).await.unwrap();
        let leases = LeaseStore::new(db.clone());
        let coordinator = WorkerCoordinator::new(leases.clone(), vec!["t".to_string()], timings());

        let identity = coordinator.try_claim_any().await.unwrap().unwrap();
        assert_eq!(coordinator.renew_once(identity.slot).await, ClaimState::Claimed { slot: 0 });

        // Simulate our lease lapsing and another process taking the slot
        sqlx::query("UPDATE worker_leases SET holder = 'other', expires_at_ms = ?")
            .bind(crate::lease::now_ms() + 30_000)
            .execute(&db)
            .await
            .unwrap();
        assert_eq!(coordinator.renew_once(identity.slot).await, ClaimState::Expired { slot: 0 });
    }

    #[test]
    fn test_credential_not_in_debug_output() {
        let identity = ClaimedIdentity {
            slot: 1,
            credential: "secret".to_string(),
        };
        assert!(!format!("{:?}", identity).contains("secret"));
    }
}
