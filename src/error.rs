//! Error types for shelf.

use thiserror::Error;

/// Common error type for shelf.
#[derive(Error, Debug)]
pub enum ShelfError {
    /// User-supplied path or filename that cannot be mapped to a storage key.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Stale revision token on a commit-based write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upload rejected before any upstream call.
    #[error("payload too large: {size} bytes (max {limit} bytes)")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Upstream call exceeded the configured deadline.
    #[error("upstream timeout: {0}")]
    Timeout(String),

    /// Upstream failure or outage, with the provider's message attached.
    #[error("provider error: {0}")]
    Provider(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for shelf operations.
pub type Result<T> = std::result::Result<T, ShelfError>;
