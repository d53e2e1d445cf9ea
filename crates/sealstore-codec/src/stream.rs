//! Narrow async byte-stream traits and in-memory endpoints.
//!
//! A `ByteStream` is a finite, pull-based sequence of bytes: not restartable,
//! cancellable by dropping the future, backpressured by the consumer's read
//! rate. A `ByteSink` is its push-side counterpart with an explicit
//! completion step. Pipeline adapters wrap one of these around another.

use async_trait::async_trait;

use crate::error::{CodecError, CodecResult};

/// Pull side of a byte stream. `read` returns 0 at end of stream.
#[async_trait]
pub trait ByteStream: Send {
    /// Read up to `buf.len()` bytes into `buf`, returning the count.
    /// A return of 0 means the stream is exhausted.
    async fn read(&mut self, buf: &mut [u8]) -> CodecResult<usize>;
}

/// Push side of a byte stream.
///
/// `complete` flushes any tail state and seals the sink; writes after
/// completion fail.
#[async_trait]
pub trait ByteSink: Send {
    /// Write all of `buf` into the sink.
    async fn write(&mut self, buf: &[u8]) -> CodecResult<()>;

    /// Flush tail state and seal the sink.
    async fn complete(&mut self) -> CodecResult<()>;
}

#[async_trait]
impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    async fn read(&mut self, buf: &mut [u8]) -> CodecResult<usize> {
        (**self).read(buf).await
    }
}

#[async_trait]
impl<S: ByteSink + ?Sized> ByteSink for Box<S> {
    async fn write(&mut self, buf: &[u8]) -> CodecResult<()> {
        (**self).write(buf).await
    }

    async fn complete(&mut self) -> CodecResult<()> {
        (**self).complete().await
    }
}

/// A `ByteStream` over owned bytes.
#[derive(Debug)]
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryStream {
    /// Create a stream serving the given bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet served.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[async_trait]
impl ByteStream for MemoryStream {
    async fn read(&mut self, buf: &mut [u8]) -> CodecResult<usize> {
        let n = self.remaining().min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// A `ByteSink` collecting everything written into a `Vec<u8>`.
#[derive(Debug, Default)]
pub struct VecSink {
    buf: Vec<u8>,
    completed: bool,
}

impl VecSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `complete` has been called.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Consume the sink, returning the collected bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Collected bytes so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[async_trait]
impl ByteSink for VecSink {
    async fn write(&mut self, buf: &[u8]) -> CodecResult<()> {
        if self.completed {
            return Err(CodecError::SinkCompleted);
        }
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn complete(&mut self) -> CodecResult<()> {
        if self.completed {
            return Err(CodecError::SinkCompleted);
        }
        self.completed = true;
        Ok(())
    }
}

/// Drain a stream to its end, collecting all bytes.
pub async fn read_to_end(stream: &mut (dyn ByteStream + '_)) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 8 * 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// Pump a stream into a sink until the stream is exhausted, then complete
/// the sink. Returns the number of bytes copied.
pub async fn copy(
    stream: &mut (dyn ByteStream + '_),
    sink: &mut (dyn ByteSink + '_),
) -> CodecResult<u64> {
    let mut chunk = [0u8; 8 * 1024];
    let mut total = 0u64;
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            sink.complete().await?;
            return Ok(total);
        }
        sink.write(&chunk[..n]).await?;
        total += n as u64;
    }
}
