//! Streaming transform adapters: layer a frame codec over a byte stream.
//!
//! Encoded layout is a sequence of `[u32 LE frame length][frame bytes]`
//! where each frame encodes at most [`CHUNK_SIZE`] bytes of the layer's
//! plaintext. Layers compose bottom-up: on encode the compressor runs inside
//! the encryptor, so encryption is the outermost transform on disk; decode
//! is the inverse. Each adapter owns its downstream, so dropping the
//! outermost adapter tears the whole chain down along with any staged
//! codec state.
//!
//! Adapters take `&mut self` on every operation: a single instance is
//! single-producer/single-consumer by construction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::codec::FrameCodec;
use crate::error::{CodecError, CodecResult};
use crate::stream::{ByteSink, ByteStream};

/// Plaintext bytes per frame.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Upper bound on an encoded frame: one chunk plus codec overhead
/// (compression worst case, nonce + auth tag). Anything larger is a
/// corrupt or hostile stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024;

const LEN_PREFIX: usize = 4;

/// Write-over-write adapter: wraps a downstream sink, staging written bytes
/// until a full chunk is available, then encoding and flushing one frame.
///
/// `complete()` encodes the tail chunk (if any), flushes it, and completes
/// the downstream sink.
pub struct CodecSink<S> {
    codec: Arc<dyn FrameCodec>,
    inner: S,
    pending: Vec<u8>,
    scratch: Vec<u8>,
    completed: bool,
}

impl<S: ByteSink> CodecSink<S> {
    /// Wrap `inner` with the encode direction of `codec`.
    pub fn new(codec: Arc<dyn FrameCodec>, inner: S) -> Self {
        Self {
            codec,
            inner,
            pending: Vec::with_capacity(CHUNK_SIZE),
            scratch: Vec::with_capacity(CHUNK_SIZE + LEN_PREFIX),
            completed: false,
        }
    }

    /// Consume the adapter, returning the downstream sink.
    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn emit(&mut self, chunk: &[u8]) -> CodecResult<()> {
        let frame = self.codec.encode_frame(chunk)?;
        self.scratch.clear();
        self.scratch
            .extend_from_slice(&(frame.len() as u32).to_le_bytes());
        self.scratch.extend_from_slice(&frame);
        self.inner.write(&self.scratch).await
    }
}

#[async_trait]
impl<S: ByteSink> ByteSink for CodecSink<S> {
    async fn write(&mut self, buf: &[u8]) -> CodecResult<()> {
        if self.completed {
            return Err(CodecError::SinkCompleted);
        }
        self.pending.extend_from_slice(buf);
        while self.pending.len() >= CHUNK_SIZE {
            let rest = self.pending.split_off(CHUNK_SIZE);
            let chunk = std::mem::replace(&mut self.pending, rest);
            self.emit(&chunk).await?;
        }
        Ok(())
    }

    async fn complete(&mut self) -> CodecResult<()> {
        if self.completed {
            return Err(CodecError::SinkCompleted);
        }
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.emit(&tail).await?;
        }
        self.completed = true;
        debug!(algo = self.codec.algorithm_tag(), "encode sink completed");
        self.inner.complete().await
    }
}

/// Read-over-read adapter in the encode direction: pulls plaintext chunks
/// from the upstream stream and serves length-prefixed encoded frames.
///
/// This is how the write path feeds a backend that consumes a pull stream.
pub struct EncodeStream<R> {
    codec: Arc<dyn FrameCodec>,
    inner: R,
    chunk: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    upstream_done: bool,
}

impl<R: ByteStream> EncodeStream<R> {
    /// Wrap `inner` with the encode direction of `codec`.
    pub fn new(codec: Arc<dyn FrameCodec>, inner: R) -> Self {
        Self {
            codec,
            inner,
            chunk: Vec::with_capacity(CHUNK_SIZE),
            out: Vec::new(),
            pos: 0,
            upstream_done: false,
        }
    }

    async fn fill_chunk(&mut self) -> CodecResult<()> {
        self.chunk.resize(CHUNK_SIZE, 0);
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let n = self.inner.read(&mut self.chunk[filled..]).await?;
            if n == 0 {
                self.upstream_done = true;
                break;
            }
            filled += n;
        }
        self.chunk.truncate(filled);
        Ok(())
    }
}

#[async_trait]
impl<R: ByteStream> ByteStream for EncodeStream<R> {
    async fn read(&mut self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.out.len() {
            if self.upstream_done {
                return Ok(0);
            }
            self.fill_chunk().await?;
            if self.chunk.is_empty() {
                return Ok(0);
            }
            let frame = self.codec.encode_frame(&self.chunk)?;
            self.out.clear();
            self.out
                .extend_from_slice(&(frame.len() as u32).to_le_bytes());
            self.out.extend_from_slice(&frame);
            self.pos = 0;
            self.chunk.clear();
        }
        let n = (self.out.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Read-over-read adapter in the decode direction: pulls length-prefixed
/// frames from the upstream stream, decodes each, and serves the decoded
/// bytes. A stream ending mid-frame is a hard error.
pub struct DecodeStream<R> {
    codec: Arc<dyn FrameCodec>,
    inner: R,
    frame: Vec<u8>,
    decoded: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: ByteStream> DecodeStream<R> {
    /// Wrap `inner` with the decode direction of `codec`.
    pub fn new(codec: Arc<dyn FrameCodec>, inner: R) -> Self {
        Self {
            codec,
            inner,
            frame: Vec::new(),
            decoded: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    /// Read exactly `buf.len()` bytes from upstream. `Ok(false)` means the
    /// upstream ended cleanly before the first byte.
    async fn read_exact(&mut self, len: usize) -> CodecResult<bool> {
        self.frame.resize(len, 0);
        let mut filled = 0;
        while filled < len {
            let n = self.inner.read(&mut self.frame[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(CodecError::TruncatedFrame);
            }
            filled += n;
        }
        Ok(true)
    }

    /// Pull and decode the next frame. Returns false at clean end of stream.
    async fn refill(&mut self) -> CodecResult<bool> {
        if !self.read_exact(LEN_PREFIX).await? {
            return Ok(false);
        }
        let len = u32::from_le_bytes([self.frame[0], self.frame[1], self.frame[2], self.frame[3]])
            as usize;
        if len > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if !self.read_exact(len).await? {
            return Err(CodecError::TruncatedFrame);
        }
        self.decoded = self.codec.decode_frame(&self.frame)?;
        self.pos = 0;
        Ok(true)
    }
}

#[async_trait]
impl<R: ByteStream> ByteStream for DecodeStream<R> {
    async fn read(&mut self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.decoded.len() {
            if self.done {
                return Ok(0);
            }
            if !self.refill().await? {
                self.done = true;
                return Ok(0);
            }
        }
        let n = (self.decoded.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
