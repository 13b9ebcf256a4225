//! Error types for coursetime-core

use thiserror::Error;

/// Main error type for the coursetime-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed request input (bad unit kind, missing identifiers)
    #[error("validation error: {0}")]
    Validation(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Catalog unit not found
    #[error("{kind} not found: {id}")]
    UnitNotFound { kind: &'static str, id: String },

    /// Caller lacks the role or ownership to view the requested scope
    #[error("not permitted: {0}")]
    PermissionDenied(String),
}

/// Result type alias for coursetime-core
pub type Result<T> = std::result::Result<T, Error>;
