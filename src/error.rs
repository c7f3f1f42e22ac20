//! Error types for shardstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for shardstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    /// Malformed key, negative position, oversized value, foreign handle
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation on a database or transaction in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Write attempted through a read-only DataFile
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Unrecognized backend identifier
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// `first` on an empty collection or tail
    #[error("Collection is empty")]
    EmptyCollection,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
