//! Sanitization detour
//!
//! A reviewer can pull an item out of review to redact identifying text.
//! One session is live at a time; approval sends the redacted item back to
//! the queue as a fresh entry, rejection drops it.

pub mod desk;
pub mod session;

pub use desk::{InputOutcome, SanitizeDesk, SessionSnapshot};
pub use session::{SanitizeMode, SanitizeSession, SanitizeStep, REDACTION_MARKER};
