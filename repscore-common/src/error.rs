//! Common error types for repscore

use thiserror::Error;

/// Common result type for repscore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across repscore crates
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

    /// JSON encoding or decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Temporary failure (timeout, lock contention, upstream hiccup).
    /// Safe to retry on a later invocation.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Work was forcibly interrupted
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Quota or rate limit breached; needs operator attention
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

// SQLite primary result codes
const SQLITE_INTERRUPT: &str = "9";
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_FULL: &str = "13";

impl Error {
    /// Classify a store failure into the scan/recompute error taxonomy.
    pub fn from_store(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => Error::Transient(err.to_string()),
            sqlx::Error::Io(_) => Error::Transient(err.to_string()),
            sqlx::Error::Database(db_err) => {
                // Extended codes carry the primary code in the low byte
                let primary = db_err
                    .code()
                    .and_then(|c| c.parse::<i64>().ok())
                    .map(|c| (c & 0xff).to_string());
                match primary.as_deref() {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => Error::Transient(err.to_string()),
                    Some(SQLITE_FULL) => Error::ResourceExhausted(err.to_string()),
                    Some(SQLITE_INTERRUPT) => Error::Cancelled(err.to_string()),
                    _ => Error::Database(err),
                }
            }
            _ => Error::Database(err),
        }
    }

    /// True when the failed operation may succeed if simply retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}
