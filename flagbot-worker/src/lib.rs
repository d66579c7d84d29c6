//! flagbot-worker library - lease-holding job drain
//!
//! Any number of identical worker processes share the database with the
//! review service. Each claims one identity slot (and with it one API
//! credential), keeps the lease alive, and drains the shared job queue.

pub mod coordinator;
pub mod dispatcher;
pub mod lease;
pub mod reactions;
pub mod retry;
pub mod stats;

pub use coordinator::{ClaimState, ClaimedIdentity, LeaseTimings, WorkerCoordinator};
pub use dispatcher::{Dispatcher, JobOutcome};
pub use lease::LeaseStore;
