//! Common error types for FlagBot

use thiserror::Error;

/// Common result type for FlagBot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across FlagBot services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Store constraint rejected the write (e.g. duplicate reviewer)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Queue invariant would be broken by the requested mutation
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Network failure talking to an external API; safe to retry
    #[error("Transient network error: {0}")]
    Transient(String),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors a caller may retry after a short backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            Error::Database(sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Error::Transient(err.to_string())
        } else {
            Error::Internal(err.to_string())
        }
    }
}

/// Map a unique-constraint failure onto `Error::Constraint`, leaving other
/// database errors untouched.
pub fn constraint_or_database(err: sqlx::Error, what: impl Into<String>) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return Error::Constraint(what.into());
        }
    }
    Error::Database(err)
}
