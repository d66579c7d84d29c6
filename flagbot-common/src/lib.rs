//! # FlagBot Common Library
//!
//! Shared code for the FlagBot review service and worker fleet:
//! - Configuration loading
//! - Database schema, models and shared queries
//! - Moderation categories and score/vote vectors
//! - The durable job queue
//! - Deviance and trust scoring
//! - The presentation port
//! - Tracing setup

pub mod categories;
pub mod config;
pub mod db;
pub mod deviance;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod presenter;

pub use categories::{Category, ScoreVector, VoteVector};
pub use error::{Error, Result};
