//! Error types for the mnemo-evolve memory system
//!
//! This module provides structured error definitions using thiserror.
//! Variants fall into four families: invalid input (caller bugs), dependency
//! failures (embedding provider), missing records, and storage failures.

use thiserror::Error;

/// Main error type for mnemo-evolve operations
#[derive(Error, Debug)]
pub enum MnemoError {
    /// Two non-empty vectors of different length were compared
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Embedding provider unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// Embedding provider rejected credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Embedding provider quota exhausted
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Memory not found
    #[error("Memory not found: {0}")]
    MemoryNotFound(String),

    /// Link not found
    #[error("Link not found: {0}")]
    LinkNotFound(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Phase was cancelled before completion
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Another run of the same phase kind is in flight
    #[error("Evolution phase already in progress: {0}")]
    PhaseInProgress(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl MnemoError {
    /// Whether the error came from the embedding provider
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            MnemoError::Embedding(_)
                | MnemoError::Network(_)
                | MnemoError::Authentication(_)
                | MnemoError::RateLimitExceeded(_)
        )
    }

    /// Whether the error reports a missing record
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MnemoError::MemoryNotFound(_) | MnemoError::LinkNotFound(_)
        )
    }
}

/// Result type alias for mnemo-evolve operations
pub type Result<T> = std::result::Result<T, MnemoError>;

/// Convert anyhow::Error to MnemoError
impl From<anyhow::Error> for MnemoError {
    fn from(err: anyhow::Error) -> Self {
        MnemoError::Other(err.to_string())
    }
}

impl From<rusqlite::Error> for MnemoError {
    fn from(err: rusqlite::Error) -> Self {
        MnemoError::Database(err.to_string())
    }
}
