//! Error types for memvault.
//!
//! Structural errors ([`MemoryError::InvalidContent`], [`MemoryError::UnknownPartition`],
//! [`MemoryError::InvalidRatio`]) are raised before any state is touched. Everything that
//! goes wrong while reading or writing durable state collapses into
//! [`MemoryError::PersistenceFailure`]. Misses (unknown ids, empty result sets) are not
//! errors at all; they come back as `false`, `None`, or an empty `Vec`.

use thiserror::Error;

/// Main error type for memory store operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Content could not be serialized, or exceeds the configured size limit.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// A partition tag outside `episodic`, `procedural`, `semantic`, `working`.
    #[error("unknown partition: {0}")]
    UnknownPartition(String),

    /// A compression ratio outside the open interval (0, 1).
    #[error("invalid compression ratio {0}: must be strictly between 0 and 1")]
    InvalidRatio(f64),

    /// An embedding provider produced a vector of the wrong length.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Durable storage could not be read or written, or failed integrity checks.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The store configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::PersistenceFailure(format!("database error: {err}"))
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceFailure(format!("I/O error: {err}"))
    }
}

/// Result type alias for memory store operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
