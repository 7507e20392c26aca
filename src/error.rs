//! Error types for shelfdb
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using ShelfError
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Unified error type for shelfdb operations
#[derive(Debug, Error)]
pub enum ShelfError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Filesystem failure, including short reads (`UnexpectedEof`)
    /// and short writes (`WriteZero`)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid property: {0}")]
    UnknownProperty(String),

    // -------------------------------------------------------------------------
    // Access Control Errors
    // -------------------------------------------------------------------------
    #[error("Access denied")]
    AuthFailed,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // -------------------------------------------------------------------------
    // Namespace Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Namespace is in use: {0}")]
    InUse(String),

    #[error("Namespace is not empty: {0}")]
    NotEmpty(String),

    #[error("No space left on this namespace (used {used}, delta {delta}, limit {limit})")]
    QuotaExceeded { used: u64, delta: u64, limit: u64 },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt entry in data file {file_id} at offset {offset}")]
    CorruptEntry { file_id: u16, offset: u64 },

    #[error("Invalid header in {}: {reason}", path.display())]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<bincode::Error> for ShelfError {
    fn from(err: bincode::Error) -> Self {
        ShelfError::Serialization(err.to_string())
    }
}
