//! LZ4 and Zstd frame compression for the transform pipeline

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Compression algorithm selection.
///
/// The wire tag is the on-disk contract: it is written under the
/// `compression` metadata key and compared byte-for-byte on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompressionAlgorithm {
    /// LZ4 block format — hot path (~4 GB/s per core)
    #[default]
    Lz4,
    /// Zstandard — higher ratio, for payloads worth the extra CPU
    Zstd {
        /// Compression level (1=fastest, 19=best ratio, 3=balanced default)
        level: i32,
    },
}

impl CompressionAlgorithm {
    /// Stable wire tag stored in object metadata.
    pub fn tag(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd { .. } => "zstd",
        }
    }

    /// Resolve a wire tag back to an algorithm. The Zstd level only affects
    /// encoding, so decode-side resolution uses the default level.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "lz4" => Some(CompressionAlgorithm::Lz4),
            "zstd" => Some(CompressionAlgorithm::Zstd { level: 3 }),
            _ => None,
        }
    }
}

/// Compress one frame with the given algorithm.
pub fn compress(data: &[u8], algo: CompressionAlgorithm) -> CodecResult<Vec<u8>> {
    match algo {
        CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionAlgorithm::Zstd { level } => {
            zstd::encode_all(data, level).map_err(|e| CodecError::CompressionFailed(e.to_string()))
        }
    }
}

/// Decompress one frame using the algorithm that produced it.
pub fn decompress(data: &[u8], algo: CompressionAlgorithm) -> CodecResult<Vec<u8>> {
    match algo {
        CompressionAlgorithm::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::DecompressionFailed(e.to_string())),
        CompressionAlgorithm::Zstd { .. } => {
            zstd::decode_all(data).map_err(|e| CodecError::DecompressionFailed(e.to_string()))
        }
    }
}
