//! Error types for catsync

use thiserror::Error;

/// Result type alias for common catsync operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Main error type for shared catsync helpers
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("Invalid column reference: {0}")]
    InvalidColumn(String),

    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),
}

impl CommonError {
    /// Create an invalid range error
    pub fn invalid_range(range: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            range: range.into(),
            reason: reason.into(),
        }
    }
}
