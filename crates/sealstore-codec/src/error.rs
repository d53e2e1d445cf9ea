//! Error types for the codec subsystem

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// All errors that can occur while transforming a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Compression operation failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),
    /// Decompression operation failed
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),
    /// Encryption operation failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    /// Decryption authentication tag mismatch — data may be corrupted or tampered
    #[error("Decryption failed: authentication tag mismatch (data may be corrupted)")]
    DecryptionAuthFailed,
    /// The encoded stream ended in the middle of a frame
    #[error("Truncated frame: encoded stream ended mid-frame")]
    TruncatedFrame,
    /// A frame header declares a length beyond the pipeline's bound
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Declared frame length in bytes.
        len: usize,
        /// Maximum accepted frame length in bytes.
        max: usize,
    },
    /// Write attempted on a sink that has already been completed
    #[error("Sink already completed")]
    SinkCompleted,
    /// I/O error from the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
