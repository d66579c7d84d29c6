//! Database schema, models and shared queries

pub mod init;
pub mod models;
pub mod refs;
pub mod scores;

pub use init::*;
pub use models::*;
