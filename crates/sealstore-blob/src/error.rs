//! Error types for the blob backend subsystem.

use thiserror::Error;

use crate::location::Location;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Error variants for backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Write or delete attempted against a location leased by another holder.
    #[error("Location is leased: {0}")]
    Locked(Location),

    /// The named container does not exist.
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// Reading the payload stream failed while the backend drained it.
    #[error("Payload stream error: {0}")]
    Stream(#[from] sealstore_codec::CodecError),

    /// Transport, authorization, or storage failure from the backend.
    #[error("Backend failure: {0}")]
    Other(String),
}
