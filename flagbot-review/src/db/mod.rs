//! Review-service queries over the shared database

pub mod assignments;
pub mod review_items;
pub mod reviewers;
