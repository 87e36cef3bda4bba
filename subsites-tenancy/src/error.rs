//! Error types for subsite operations.

use thiserror::Error;

/// Result type for subsite operations.
pub type TenantResult<T> = Result<T, TenantError>;

/// Subsite errors.
#[derive(Debug, Error)]
pub enum TenantError {
    /// Subsite (or another record) not found
    #[error("Subsite not found: {0}")]
    NotFound(String),

    /// Malformed identifier or argument
    #[error("Invalid subsite identifier: {0}")]
    Invalid(String),

    /// A write was rejected by validation; the message is user-facing
    #[error("{0}")]
    Validation(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TenantError {
    /// Whether this error carries a message meant for the end user.
    pub fn is_validation(&self) -> bool {
        matches!(self, TenantError::Validation(_))
    }
}
