//! Error types for the loader engine

use coalesce_batch::BatchError;
use thiserror::Error;

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Errors surfaced by loader operations.
///
/// Payloads are plain strings and the type is `Clone` so a single failure can
/// be delivered to every caller joined on one in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoaderError {
    /// The backend service lacks a method the request requires. Raised when a
    /// batch group is created, not per key.
    #[error("capability error: {0}")]
    Capability(String),

    /// A value destined for a cache key could not be serialized. Signals a
    /// caller-side bug; never retried.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure from the backend's get/find call, propagated unchanged.
    #[error("backend error: {0}")]
    Backend(String),

    /// Failure from the pluggable cache store.
    #[error("cache store error: {0}")]
    Store(String),

    /// Registry misuse, such as requesting an unregistered service.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        LoaderError::Serialization(err.to_string())
    }
}

impl From<BatchError<LoaderError>> for LoaderError {
    fn from(err: BatchError<LoaderError>) -> Self {
        match err {
            BatchError::Fetch(inner) => inner,
            other => LoaderError::Backend(other.to_string()),
        }
    }
}
