//! Error types for the secure store subsystem.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error variants for store operations.
///
/// An optimistic write losing the etag race is not an error: it is surfaced
/// as `ok = false` on the outcome value. Cancellation never surfaces here
/// either: a cancelled operation is a dropped future, not an error value.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An option was requested but the corresponding collaborator is absent.
    #[error("Not configured: {0} is required by the requested options")]
    NotConfigured(&'static str),

    /// Stored metadata declares an algorithm or type the caller cannot satisfy.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Failure from the blob backend, including leased-location rejections.
    #[error("Backend error: {0}")]
    Backend(#[from] sealstore_blob::BackendError),

    /// Failure in the compression/encryption pipeline.
    #[error("Codec error: {0}")]
    Codec(#[from] sealstore_codec::CodecError),

    /// Typed-object payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A queue rejected a notification. The payload is already durable on
    /// the backend; the caller may retry the notification.
    #[error("Queue dispatch failed: {0}")]
    QueueDispatch(String),

    /// The ID generator exhausted its retry budget against the counter blob.
    #[error("ID range allocation failed after {attempts} attempts")]
    RangeAllocationFailed {
        /// Number of conditional-write attempts made.
        attempts: u32,
    },
}
