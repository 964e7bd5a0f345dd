//! Error types for podsync
//!
//! The taxonomy mirrors how failures propagate through a sync run:
//! - Feed failures abort only that feed's pass
//! - Transport and integrity failures are retried within the downloader's budget
//! - Filesystem failures are fatal to one task, the run continues
//! - Configuration inconsistencies are skipped with a warning

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for podsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for podsync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "feed_id")
        key: Option<String>,
    },

    /// Feed could not be fetched or parsed (fatal to that feed's pass only)
    #[error("feed unavailable: {url}: {reason}")]
    FeedUnavailable {
        /// The feed URL that failed
        url: String,
        /// What went wrong (network, HTTP status, parse error)
        reason: String,
    },

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The HTTP status code returned
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// Non-HTTPS URL rejected while https_only mode is active
    #[error("non-HTTPS URL rejected: {url}")]
    HttpsRequired {
        /// The offending URL
        url: String,
    },

    /// Post-write hash verification failed
    #[error("integrity mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// File whose digest did not match its sidecar
        path: PathBuf,
        /// Digest recorded in the sidecar
        expected: String,
        /// Digest computed from the file on disk
        actual: String,
    },

    /// Directory creation/removal or file deletion failed (fatal to one task)
    #[error("filesystem error at {path}: {reason}")]
    Filesystem {
        /// The path the operation failed on
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Tracking store operation failed
    #[error("tracking store error: {0}")]
    Store(#[from] StoreError),

    /// SQLx database error
    #[error("tracking store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sync run stopped by the cooperative stop signal
    #[error("sync run stopped by request")]
    Stopped,
}

/// Tracking-store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open the store
    #[error("failed to open tracking store: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}
