//! Consensus review queue
//!
//! Items flagged by the classifier wait here until enough reviewers have
//! voted on them. Each reviewer works on one item at a time; whenever an
//! event frees capacity or adds supply, idle reviewers are backfilled.

pub mod decision;
pub mod queue;
mod workflow;

pub use decision::{decide, CastVote};
pub use queue::{Finalized, ReviewQueue, ReviewSettings, VoteOutcome};
