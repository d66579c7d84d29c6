//! HTTP API handlers for flagbot-review

pub mod health;
pub mod messages;
pub mod reviewers;
pub mod sanitize;
pub mod settings;
pub mod votes;
