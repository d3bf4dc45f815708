//! Core error types for challenge-core.
//!
//! `CoreError` is the taxonomy every operation surfaces to its caller. The
//! domain variants (`NotFound` through `Unknown`) are what the presentation
//! layer reacts to; the remaining variants wrap ambient failures of the
//! local store and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for challenge-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The challenge, member or reason does not exist for the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller is not a participant or lacks the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A state-machine precondition was violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A reset timestamp lies outside the accepted window
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Malformed input such as an empty reason
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The transport could not reach its backend
    #[error("Network error: {0}")]
    Network(String),

    /// A transport call did not finish within the caller's timeout
    #[error("Operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Anything the transport could not classify
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_timestamp(msg: impl Into<String>) -> Self {
        Self::InvalidTimestamp(msg.into())
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// The data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text was empty or whitespace only
    #[error("'{field}' must not be empty")]
    Empty { field: String },

    /// Text exceeded the configured limit
    #[error("'{field}' is {len} characters long (limit: {max})")]
    TooLong { field: String, max: usize, len: usize },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Check a free-text field against an optional character limit.
    pub fn check_text(field: &str, value: &str, max: Option<usize>) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: field.to_string(),
            });
        }
        check_len(field, value, max)
    }
}

/// Length-only check; empty text passes.
pub(crate) fn check_len(field: &str, value: &str, max: Option<usize>) -> Result<(), ValidationError> {
    let len = value.chars().count();
    match max {
        Some(max) if len > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
            len,
        }),
        _ => Ok(()),
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked
                    || err.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
