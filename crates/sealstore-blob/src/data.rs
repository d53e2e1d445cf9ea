//! Payload stream bundled with its metadata.

use async_trait::async_trait;
use sealstore_codec::{read_to_end, ByteStream, CodecResult, MemoryStream};

use crate::metadata::Metadata;

/// Hook fired exactly once when the payload stream is dropped.
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A chunked payload stream paired with object metadata.
///
/// The stream may carry a release hook (e.g. a backend connection or handle
/// count) fired when it is dropped; pipeline adapters wrapped around the
/// stream keep the hook alive until the outermost layer is dropped.
pub struct DataWithMetadata {
    stream: Box<dyn ByteStream>,
    metadata: Metadata,
}

impl DataWithMetadata {
    /// Bundle a stream with metadata.
    pub fn new(stream: Box<dyn ByteStream>, metadata: Metadata) -> Self {
        Self { stream, metadata }
    }

    /// Bundle a stream with metadata and a release hook fired on drop.
    pub fn with_release(stream: Box<dyn ByteStream>, metadata: Metadata, hook: ReleaseHook) -> Self {
        Self {
            stream: Box::new(ReleaseStream {
                inner: stream,
                release: Some(hook),
            }),
            metadata,
        }
    }

    /// Bundle in-memory bytes with metadata.
    pub fn from_bytes(bytes: Vec<u8>, metadata: Metadata) -> Self {
        Self::new(Box::new(MemoryStream::new(bytes)), metadata)
    }

    /// The metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable access to the metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Split into the stream and the metadata. Any release hook stays
    /// attached to the stream.
    pub fn into_parts(self) -> (Box<dyn ByteStream>, Metadata) {
        (self.stream, self.metadata)
    }

    /// Drain the stream to its end, returning the bytes and metadata. The
    /// release hook fires as the drained stream is dropped.
    pub async fn read_to_end(mut self) -> CodecResult<(Vec<u8>, Metadata)> {
        let bytes = read_to_end(&mut self.stream).await?;
        Ok((bytes, self.metadata))
    }
}

impl std::fmt::Debug for DataWithMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataWithMetadata")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

struct ReleaseStream {
    inner: Box<dyn ByteStream>,
    release: Option<ReleaseHook>,
}

#[async_trait]
impl ByteStream for ReleaseStream {
    async fn read(&mut self, buf: &mut [u8]) -> CodecResult<usize> {
        self.inner.read(buf).await
    }
}

impl Drop for ReleaseStream {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn read_to_end_returns_bytes_and_metadata() {
        let mut meta = Metadata::new();
        meta.set("a", "1");
        let data = DataWithMetadata::from_bytes(vec![1, 2, 3], meta);
        let (bytes, meta) = data.read_to_end().await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(meta.get("a"), Some("1"));
    }

    #[tokio::test]
    async fn release_hook_fires_on_drop() {
        let fired = Arc::new(AtomicBool::new(false));
        let hook_fired = fired.clone();
        let data = DataWithMetadata::with_release(
            Box::new(MemoryStream::new(vec![0u8; 16])),
            Metadata::new(),
            Box::new(move || hook_fired.store(true, Ordering::SeqCst)),
        );
        assert!(!fired.load(Ordering::SeqCst));
        drop(data);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn release_hook_survives_into_parts() {
        let fired = Arc::new(AtomicBool::new(false));
        let hook_fired = fired.clone();
        let data = DataWithMetadata::with_release(
            Box::new(MemoryStream::new(vec![0u8; 16])),
            Metadata::new(),
            Box::new(move || hook_fired.store(true, Ordering::SeqCst)),
        );
        let (stream, _meta) = data.into_parts();
        assert!(!fired.load(Ordering::SeqCst));
        drop(stream);
        assert!(fired.load(Ordering::SeqCst));
    }
}
