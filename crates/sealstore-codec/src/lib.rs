#![warn(missing_docs)]

//! Sealstore codec subsystem: frame codecs (LZ4/Zstd compression, AES-GCM/ChaCha20
//! encryption) and the streaming transform pipeline that layers them over chunked
//! byte streams.
//!
//! Encode path: plaintext → compress → encrypt → backend
//! Decode path: backend → decrypt → decompress → plaintext

pub mod codec;
pub mod compression;
pub mod encryption;
pub mod error;
pub mod pipeline;
pub mod stream;

pub use codec::{Compressor, Encryptor, FrameCodec};
pub use compression::CompressionAlgorithm;
pub use encryption::{EncryptionAlgorithm, EncryptionKey};
pub use error::{CodecError, CodecResult};
pub use pipeline::{CodecSink, DecodeStream, EncodeStream, CHUNK_SIZE};
pub use stream::{copy, read_to_end, ByteSink, ByteStream, MemoryStream, VecSink};
