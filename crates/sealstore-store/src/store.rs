//! The secure store facade: pipeline composition, metadata invariants,
//! optimistic writes, deletion semantics, and queue fan-out.

use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use sealstore_blob::{
    keys, BlobBackend, DataWithMetadata, Lease, Location, LocationWithMetadata, Metadata, Snapshot,
    SnapshotId,
};
use sealstore_codec::{ByteStream, DecodeStream, EncodeStream, FrameCodec};

use crate::error::{StoreError, StoreResult};
use crate::idgen::RangeIdGenerator;
use crate::options::SaveOptions;
use crate::queue::{NotificationQueue, QueueMessage};

/// Result of a completed save: the final location (with any generated id)
/// and the metadata the backend stored, fresh etag included.
#[derive(Debug)]
pub struct SaveReceipt {
    /// Where the object landed.
    pub location: Location,
    /// Stored metadata with backend-populated keys and the new etag.
    pub metadata: Metadata,
}

/// Outcome of an optimistic save. Losing the etag race is a value
/// (`ok = false`), not an error.
#[derive(Debug)]
pub struct OptimisticOutcome {
    /// Whether the conditional write was applied.
    pub ok: bool,
    /// Receipt of the applied write, when `ok`.
    pub receipt: Option<SaveReceipt>,
}

/// Operation counters for one store instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Completed unconditional saves.
    pub saves: u64,
    /// Conditional save attempts.
    pub optimistic_saves: u64,
    /// Conditional saves that lost the etag race.
    pub conflicts: u64,
    /// Loads that returned a payload.
    pub loads: u64,
    /// Loads suppressed because the object carried a tombstone.
    pub tombstones_filtered: u64,
    /// Completed deletes (soft or permanent).
    pub deletes: u64,
    /// Queue notifications acknowledged.
    pub notifications: u64,
}

/// Secure object store facade over a [`BlobBackend`].
///
/// Collaborators are all optional except the backend; an operation that
/// needs an absent collaborator fails with [`StoreError::NotConfigured`].
pub struct SecureStore {
    backend: Arc<dyn BlobBackend>,
    compressor: Option<Arc<dyn FrameCodec>>,
    encryptor: Option<Arc<dyn FrameCodec>>,
    ids: Option<Arc<RangeIdGenerator>>,
    backup_queue: Option<Arc<dyn NotificationQueue>>,
    index_queue: Option<Arc<dyn NotificationQueue>>,
    stats: std::sync::Mutex<StoreStats>,
}

/// Assembles a [`SecureStore`] from its collaborators.
pub struct SecureStoreBuilder {
    backend: Arc<dyn BlobBackend>,
    compressor: Option<Arc<dyn FrameCodec>>,
    encryptor: Option<Arc<dyn FrameCodec>>,
    ids: Option<Arc<RangeIdGenerator>>,
    backup_queue: Option<Arc<dyn NotificationQueue>>,
    index_queue: Option<Arc<dyn NotificationQueue>>,
}

impl SecureStoreBuilder {
    /// Codec used for the `COMPRESS` option and for reading compressed
    /// payloads.
    pub fn compressor(mut self, codec: impl FrameCodec + 'static) -> Self {
        self.compressor = Some(Arc::new(codec));
        self
    }

    /// Codec used for the `ENCRYPT` option and for reading encrypted
    /// payloads.
    pub fn encryptor(mut self, codec: impl FrameCodec + 'static) -> Self {
        self.encryptor = Some(Arc::new(codec));
        self
    }

    /// Allocator used for the `GENERATE_ID` option.
    pub fn id_generator(mut self, ids: RangeIdGenerator) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Queue receiving `BACKUP` notifications.
    pub fn backup_queue(mut self, queue: Arc<dyn NotificationQueue>) -> Self {
        self.backup_queue = Some(queue);
        self
    }

    /// Queue receiving `INDEX` notifications.
    pub fn index_queue(mut self, queue: Arc<dyn NotificationQueue>) -> Self {
        self.index_queue = Some(queue);
        self
    }

    /// Finish assembly.
    pub fn build(self) -> SecureStore {
        SecureStore {
            backend: self.backend,
            compressor: self.compressor,
            encryptor: self.encryptor,
            ids: self.ids,
            backup_queue: self.backup_queue,
            index_queue: self.index_queue,
            stats: std::sync::Mutex::new(StoreStats::default()),
        }
    }
}

impl SecureStore {
    /// Start assembling a store over `backend`.
    pub fn builder(backend: Arc<dyn BlobBackend>) -> SecureStoreBuilder {
        SecureStoreBuilder {
            backend,
            compressor: None,
            encryptor: None,
            ids: None,
            backup_queue: None,
            index_queue: None,
        }
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn bump<F: FnOnce(&mut StoreStats)>(&self, f: F) {
        f(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// Save a payload stream.
    ///
    /// Metadata is tagged (or stripped) per the codec options, the stream
    /// is wrapped so the backend pulls encoded bytes chunk by chunk, an id
    /// is allocated when requested and absent, and after the backend ack
    /// the backup/index notifications run in parallel. A queue failure
    /// aborts the save with an error even though the payload is already
    /// durable; the caller may retry the notification.
    #[instrument(skip(self, data), fields(loc = %loc))]
    pub async fn save_data(
        &self,
        loc: &Location,
        data: DataWithMetadata,
        options: SaveOptions,
    ) -> StoreResult<SaveReceipt> {
        let (loc, payload) = self.prepare_save(loc, data, options).await?;
        let metadata = self.backend.save(&loc, payload).await?;
        self.bump(|s| s.saves += 1);
        debug!(loc = %loc, "object saved");
        self.dispatch(&loc, &metadata, options).await?;
        Ok(SaveReceipt { location: loc, metadata })
    }

    /// Save conditionally on the etag carried by the payload's metadata: a
    /// present etag means update-if-unchanged, an absent etag means
    /// create-if-absent. Nothing is enqueued for a lost race.
    #[instrument(skip(self, data), fields(loc = %loc))]
    pub async fn save_with_etag(
        &self,
        loc: &Location,
        data: DataWithMetadata,
        options: SaveOptions,
    ) -> StoreResult<OptimisticOutcome> {
        let (loc, payload) = self.prepare_save(loc, data, options).await?;
        let outcome = self.backend.try_optimistic_write(&loc, payload).await?;
        self.bump(|s| s.optimistic_saves += 1);
        if !outcome.ok {
            self.bump(|s| s.conflicts += 1);
            return Ok(OptimisticOutcome {
                ok: false,
                receipt: None,
            });
        }
        let metadata = outcome.metadata.ok_or_else(|| {
            StoreError::InvariantViolation(
                "backend applied a conditional write without returning metadata".to_string(),
            )
        })?;
        self.dispatch(&loc, &metadata, options).await?;
        Ok(OptimisticOutcome {
            ok: true,
            receipt: Some(SaveReceipt { location: loc, metadata }),
        })
    }

    /// Serialize `value` as UTF-8 JSON, tag the metadata with the logical
    /// type name, and save. The type name is opaque to the store and
    /// compared by equality on load.
    pub async fn save_object<T: Serialize>(
        &self,
        loc: &Location,
        value: &T,
        type_name: &str,
        mut metadata: Metadata,
        options: SaveOptions,
    ) -> StoreResult<SaveReceipt> {
        let bytes = serde_json::to_vec(value)?;
        metadata.set(keys::TYPE, type_name);
        self.save_data(loc, DataWithMetadata::from_bytes(bytes, metadata), options)
            .await
    }

    /// Load a payload, decoding per the stored metadata.
    ///
    /// Returns `None` for absent objects and for tombstoned ones (snapshot
    /// loads ignore the tombstone). Encrypted or compressed payloads
    /// require a configured codec whose algorithm tag matches the stored
    /// one; anything else is an invariant violation.
    #[instrument(skip(self), fields(loc = %loc))]
    pub async fn load_data(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> StoreResult<Option<DataWithMetadata>> {
        let Some(data) = self.backend.load(loc, snapshot).await? else {
            return Ok(None);
        };
        if snapshot.is_none() && data.metadata().is_tombstoned() {
            // Dropping the handle fires the backend's release hook.
            drop(data);
            self.bump(|s| s.tombstones_filtered += 1);
            debug!(loc = %loc, "load suppressed by tombstone");
            return Ok(None);
        }

        let (stream, metadata) = data.into_parts();
        let mut stream: Box<dyn ByteStream> = stream;
        if let Some(tag) = metadata.encryption() {
            let codec = Self::matching_codec(&self.encryptor, tag, "encrypted", "decryptor")?;
            stream = Box::new(DecodeStream::new(codec, stream));
        }
        if let Some(tag) = metadata.compression() {
            let codec = Self::matching_codec(&self.compressor, tag, "compressed", "decompressor")?;
            stream = Box::new(DecodeStream::new(codec, stream));
        }
        self.bump(|s| s.loads += 1);
        Ok(Some(DataWithMetadata::new(stream, metadata)))
    }

    /// Load a typed object saved with [`SecureStore::save_object`],
    /// verifying the stored type name before deserializing.
    pub async fn load_object<T: DeserializeOwned>(
        &self,
        loc: &Location,
        expected_type: &str,
    ) -> StoreResult<Option<T>> {
        let Some(data) = self.load_data(loc, None).await? else {
            return Ok(None);
        };
        let (bytes, metadata) = data.read_to_end().await?;
        match metadata.type_name() {
            Some(actual) if actual == expected_type => {}
            other => {
                return Err(StoreError::InvariantViolation(format!(
                    "expected typed payload {expected_type:?}, found {other:?}"
                )))
            }
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Delete an object: soft (tombstone, snapshots kept) with
    /// `KEEP_DELETES`, permanent otherwise. A missing object is a noop.
    /// Backup/index notifications fire per the options, carrying the
    /// metadata as it was before the delete. Returns whether an object was
    /// there.
    #[instrument(skip(self), fields(loc = %loc))]
    pub async fn delete(&self, loc: &Location, options: SaveOptions) -> StoreResult<bool> {
        let Some(metadata) = self.backend.get_metadata(loc, None).await? else {
            return Ok(false);
        };
        if options.contains(SaveOptions::KEEP_DELETES) {
            self.backend.soft_delete(loc).await?;
        } else {
            self.backend.permanent_delete(loc).await?;
        }
        self.bump(|s| s.deletes += 1);
        debug!(loc = %loc, soft = options.contains(SaveOptions::KEEP_DELETES), "object deleted");
        self.dispatch(loc, &metadata, options).await?;
        Ok(true)
    }

    /// Metadata of an object or snapshot, unfiltered: a tombstoned object
    /// still reports its metadata here (the load path does the filtering).
    pub async fn get_metadata(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> StoreResult<Option<Metadata>> {
        Ok(self.backend.get_metadata(loc, snapshot).await?)
    }

    /// Discover the snapshots of a location, order unspecified.
    pub async fn find_snapshots(&self, loc: &Location) -> StoreResult<mpsc::Receiver<Snapshot>> {
        Ok(self.backend.find_snapshots(loc).await?)
    }

    /// List objects in a container, optionally restricted to a key prefix.
    pub async fn find_files(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> StoreResult<mpsc::Receiver<LocationWithMetadata>> {
        Ok(self.backend.find_files(container, prefix).await?)
    }

    /// Acquire an exclusive lease on a location. `None` when already held.
    /// While leased, writes from any other path fail with the backend's
    /// locked error.
    pub async fn lock(&self, loc: &Location) -> StoreResult<Option<Lease>> {
        Ok(self.backend.lock(loc).await?)
    }

    /// Enqueue one index notification per object under the prefix.
    /// Tombstoned entries the backend lists are notified too; the index
    /// consumer must tolerate them. Returns the number of messages sent.
    pub async fn re_index_all(&self, container: &str, prefix: Option<&str>) -> StoreResult<usize> {
        let queue = self
            .index_queue
            .clone()
            .ok_or(StoreError::NotConfigured("index queue"))?;
        self.notify_all(container, prefix, queue).await
    }

    /// Enqueue one backup notification per object under the prefix, with
    /// the same tombstone caveat as [`SecureStore::re_index_all`].
    pub async fn backup_all(&self, container: &str, prefix: Option<&str>) -> StoreResult<usize> {
        let queue = self
            .backup_queue
            .clone()
            .ok_or(StoreError::NotConfigured("backup queue"))?;
        self.notify_all(container, prefix, queue).await
    }

    /// Tag or strip codec metadata, wrap the stream with the encode-side
    /// pipeline (compress innermost, encrypt outermost), and allocate an id
    /// when requested.
    async fn prepare_save(
        &self,
        loc: &Location,
        data: DataWithMetadata,
        options: SaveOptions,
    ) -> StoreResult<(Location, DataWithMetadata)> {
        let (stream, mut metadata) = data.into_parts();
        let mut stream: Box<dyn ByteStream> = stream;

        if options.contains(SaveOptions::COMPRESS) {
            let codec = self
                .compressor
                .clone()
                .ok_or(StoreError::NotConfigured("compressor"))?;
            metadata.set(keys::COMPRESSION, codec.algorithm_tag());
            stream = Box::new(EncodeStream::new(codec, stream));
        } else {
            metadata.remove(keys::COMPRESSION);
        }

        if options.contains(SaveOptions::ENCRYPT) {
            let codec = self
                .encryptor
                .clone()
                .ok_or(StoreError::NotConfigured("encryptor"))?;
            metadata.set(keys::ENCRYPTION, codec.algorithm_tag());
            stream = Box::new(EncodeStream::new(codec, stream));
        } else {
            metadata.remove(keys::ENCRYPTION);
        }

        let loc = if options.contains(SaveOptions::GENERATE_ID) && loc.id().is_none() {
            let ids = self
                .ids
                .as_ref()
                .ok_or(StoreError::NotConfigured("id generator"))?;
            loc.assign_id(ids.next_id().await?)
        } else {
            loc.clone()
        };

        Ok((loc, DataWithMetadata::new(stream, metadata)))
    }

    /// Fan the notification out to the queues the options request, in
    /// parallel. All sends are attempted; the first failure is surfaced.
    async fn dispatch(
        &self,
        loc: &Location,
        metadata: &Metadata,
        options: SaveOptions,
    ) -> StoreResult<()> {
        let mut sends: Vec<(Arc<dyn NotificationQueue>, QueueMessage)> = Vec::new();
        if options.contains(SaveOptions::BACKUP) {
            let queue = self
                .backup_queue
                .clone()
                .ok_or(StoreError::NotConfigured("backup queue"))?;
            sends.push((queue, QueueMessage::new(loc, metadata.clone())));
        }
        if options.contains(SaveOptions::INDEX) {
            let queue = self
                .index_queue
                .clone()
                .ok_or(StoreError::NotConfigured("index queue"))?;
            sends.push((queue, QueueMessage::new(loc, metadata.clone())));
        }
        if sends.is_empty() {
            return Ok(());
        }

        let results = join_all(sends.iter().map(|(queue, msg)| queue.send(msg))).await;
        let acked = results.iter().filter(|r| r.is_ok()).count() as u64;
        self.bump(|s| s.notifications += acked);
        for result in results {
            result?;
        }
        Ok(())
    }

    async fn notify_all(
        &self,
        container: &str,
        prefix: Option<&str>,
        queue: Arc<dyn NotificationQueue>,
    ) -> StoreResult<usize> {
        let mut rx = self.backend.find_files(container, prefix).await?;
        let mut messages = Vec::new();
        while let Some(entry) = rx.recv().await {
            messages.push(QueueMessage::new(&entry.location, entry.metadata));
        }
        let results = join_all(messages.iter().map(|msg| queue.send(msg))).await;
        let total = results.len();
        let acked = results.iter().filter(|r| r.is_ok()).count() as u64;
        self.bump(|s| s.notifications += acked);
        debug!(container, total, "bulk notification dispatched");
        let mut first_err = None;
        for result in results {
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }

    fn matching_codec(
        configured: &Option<Arc<dyn FrameCodec>>,
        stored_tag: &str,
        payload_kind: &str,
        codec_kind: &str,
    ) -> StoreResult<Arc<dyn FrameCodec>> {
        match configured {
            Some(codec) if codec.algorithm_tag() == stored_tag => Ok(codec.clone()),
            Some(codec) => Err(StoreError::InvariantViolation(format!(
                "payload is {payload_kind} with {stored_tag:?} but the configured {codec_kind} is {:?}",
                codec.algorithm_tag()
            ))),
            None => Err(StoreError::InvariantViolation(format!(
                "payload is {payload_kind} with {stored_tag:?} but no {codec_kind} is configured"
            ))),
        }
    }
}

impl std::fmt::Debug for SecureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStore")
            .field("compressor", &self.compressor.as_ref().map(|c| c.algorithm_tag()))
            .field("encryptor", &self.encryptor.as_ref().map(|c| c.algorithm_tag()))
            .field("id_generator", &self.ids.is_some())
            .field("backup_queue", &self.backup_queue.is_some())
            .field("index_queue", &self.index_queue.is_some())
            .finish_non_exhaustive()
    }
}
