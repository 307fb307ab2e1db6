//! Error types for torrss
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] is the crate-wide error returned by fallible operations
//! - [`DatabaseError`] covers SQLite persistence failures
//! - [`ClientError`] covers the download client (qBittorrent Web API)
//!
//! Per-entry failures inside an admission run (fetch timeouts, client API
//! errors, insufficient space) are *not* errors at this level: they degrade
//! to a rejection reason stored on the entry's history record. Only run-level
//! failures surface as [`Error`].

use thiserror::Error;

/// Result type alias for torrss operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for torrss
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "title_regex")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download client error
    #[error("download client error: {0}")]
    Client(#[from] ClientError),

    /// Feed could not be fetched or parsed
    #[error("feed error: {0}")]
    Feed(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task or record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not starting new runs
    #[error("shutdown in progress: not starting new runs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Download client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// No client host configured; nothing is ever submitted
    #[error("download client is not configured")]
    NotConfigured,

    /// Login rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The client answered with a non-success status
    #[error("API error {status_code}: {message}")]
    Api {
        /// HTTP status code returned by the client
        status_code: u16,
        /// Response body, if any
        message: String,
    },

    /// Transport-level failure talking to the client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The client answered with something we could not interpret
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
