//! Error types for catsync runs
//!
//! Every variant is fatal to the run that raised it. Messages are written for
//! the operator reading the final status line, so each one says what failed
//! and, where it helps, what to check.

use catsync_common::CommonError;
use thiserror::Error;

/// Result type alias for catsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse error category reported with an aborted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StoreRead,
    RateLimited,
    Transport,
    Api,
    StoreWrite,
    Checkpoint,
    LeaseHeld,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::StoreRead => "StoreReadError",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Api => "ApiError",
            ErrorKind::StoreWrite => "StoreWriteError",
            ErrorKind::Checkpoint => "CheckpointError",
            ErrorKind::LeaseHeld => "LeaseHeld",
            ErrorKind::Config => "ConfigError",
        };
        write!(f, "{}", name)
    }
}

/// Error type for everything a run can fail on
#[derive(Error, Debug)]
pub enum SyncError {
    /// The record snapshot could not be read
    #[error("Failed to read table: {0}")]
    StoreRead(String),

    /// The enrichment API answered 429
    #[error("Enrichment API rate limit reached: not enough request tokens. Wait for tokens to refill before the next run.")]
    RateLimited,

    /// Non-success status, connection failure, timeout, or unreadable body
    #[error("Enrichment API request failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Success status with an application-level error in the payload
    #[error("Enrichment API returned an error: {0}")]
    Api(String),

    /// The bulk row write was rejected
    #[error("Failed to write table: {0}")]
    StoreWrite(String),

    /// The checkpoint slot could not be read or written
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Another run holds the lease
    #[error("Another run ({holder}) has held the run lease since {since}. Wait for it to finish or remove a stale lease with 'catsync reset --force'.")]
    LeaseHeld { holder: String, since: String },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check catsync.toml and CATSYNC_* environment variables.")]
    Config(String),
}

impl SyncError {
    /// Category used in run reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::StoreRead(_) => ErrorKind::StoreRead,
            SyncError::RateLimited => ErrorKind::RateLimited,
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::Api(_) => ErrorKind::Api,
            SyncError::StoreWrite(_) => ErrorKind::StoreWrite,
            SyncError::Checkpoint(_) => ErrorKind::Checkpoint,
            SyncError::LeaseHeld { .. } => ErrorKind::LeaseHeld,
            SyncError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn store_read(msg: impl Into<String>) -> Self {
        Self::StoreRead(msg.into())
    }

    pub fn store_write(msg: impl Into<String>) -> Self {
        Self::StoreWrite(msg.into())
    }

    pub fn transport(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: msg.into(),
        }
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<CommonError> for SyncError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::InvalidCheckpoint(_) => SyncError::Checkpoint(err.to_string()),
            CommonError::InvalidRange { .. } | CommonError::InvalidColumn(_) => {
                SyncError::Config(err.to_string())
            },
            other => SyncError::StoreRead(other.to_string()),
        }
    }
}
