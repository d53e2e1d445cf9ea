//! The frame codec contract and its two implementations.
//!
//! A codec is a value with an algorithm tag (the on-disk contract, stored in
//! object metadata) and stateless per-frame encode/decode. Statelessness is
//! what makes a single codec instance safe to share across concurrent
//! pipelines without a lock.

use crate::compression::{self, CompressionAlgorithm};
use crate::encryption::{self, EncryptionAlgorithm, EncryptionKey};
use crate::error::CodecResult;

/// A per-frame byte transform with a stable algorithm tag.
pub trait FrameCodec: Send + Sync {
    /// Wire tag recorded in object metadata and matched on decode.
    fn algorithm_tag(&self) -> &'static str;

    /// Encode one plaintext frame.
    fn encode_frame(&self, frame: &[u8]) -> CodecResult<Vec<u8>>;

    /// Decode one encoded frame.
    fn decode_frame(&self, frame: &[u8]) -> CodecResult<Vec<u8>>;
}

/// Compression codec over a [`CompressionAlgorithm`].
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    algo: CompressionAlgorithm,
}

impl Compressor {
    /// Create a compressor for the given algorithm.
    pub fn new(algo: CompressionAlgorithm) -> Self {
        Self { algo }
    }

    /// The configured algorithm.
    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algo
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressionAlgorithm::default())
    }
}

impl FrameCodec for Compressor {
    fn algorithm_tag(&self) -> &'static str {
        self.algo.tag()
    }

    fn encode_frame(&self, frame: &[u8]) -> CodecResult<Vec<u8>> {
        compression::compress(frame, self.algo)
    }

    fn decode_frame(&self, frame: &[u8]) -> CodecResult<Vec<u8>> {
        compression::decompress(frame, self.algo)
    }
}

/// AEAD encryption codec over an [`EncryptionAlgorithm`] and a supplied key.
#[derive(Clone)]
pub struct Encryptor {
    key: EncryptionKey,
    algo: EncryptionAlgorithm,
}

impl Encryptor {
    /// Create an encryptor with the given key and algorithm.
    pub fn new(key: EncryptionKey, algo: EncryptionAlgorithm) -> Self {
        Self { key, algo }
    }

    /// The configured algorithm.
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algo
    }
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("algo", &self.algo)
            .finish_non_exhaustive()
    }
}

impl FrameCodec for Encryptor {
    fn algorithm_tag(&self) -> &'static str {
        self.algo.tag()
    }

    fn encode_frame(&self, frame: &[u8]) -> CodecResult<Vec<u8>> {
        encryption::seal(frame, &self.key, self.algo)
    }

    fn decode_frame(&self, frame: &[u8]) -> CodecResult<Vec<u8>> {
        encryption::open(frame, &self.key, self.algo)
    }
}
