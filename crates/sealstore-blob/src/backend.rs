//! The pluggable blob backend contract.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::data::DataWithMetadata;
use crate::error::BackendResult;
use crate::lease::Lease;
use crate::location::Location;
use crate::metadata::Metadata;
use crate::snapshot::{Snapshot, SnapshotId};

/// Outcome of a conditional write.
#[derive(Debug)]
pub struct OptimisticWrite {
    /// Whether the write was applied.
    pub ok: bool,
    /// Metadata of the written object (fresh etag), when applied.
    pub metadata: Option<Metadata>,
}

impl OptimisticWrite {
    /// A lost conditional write.
    pub fn conflict() -> Self {
        Self {
            ok: false,
            metadata: None,
        }
    }

    /// A won conditional write with the resulting metadata.
    pub fn applied(metadata: Metadata) -> Self {
        Self {
            ok: true,
            metadata: Some(metadata),
        }
    }
}

/// A listed location and the metadata stored with it.
#[derive(Debug, Clone)]
pub struct LocationWithMetadata {
    /// The listed location.
    pub location: Location,
    /// Its stored metadata.
    pub metadata: Metadata,
}

/// Abstract storage primitive the facade is layered over: conditional
/// (etag-gated) writes, snapshots on overwrite, soft/permanent deletion,
/// per-object metadata, and advisory leases.
///
/// Listing operations return bounded channels so callers consume entries at
/// their own pace; dropping the receiver cancels the walk.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Idempotent overwrite. Creates a snapshot of the previous version when
    /// one exists. Returns metadata carrying the fresh etag and the
    /// backend-populated keys.
    async fn save(&self, loc: &Location, data: DataWithMetadata) -> BackendResult<Metadata>;

    /// Conditional write: applied only when the stored etag equals the etag
    /// in the supplied metadata, or, with no supplied etag, when the object
    /// does not yet exist.
    async fn try_optimistic_write(
        &self,
        loc: &Location,
        data: DataWithMetadata,
    ) -> BackendResult<OptimisticWrite>;

    /// Load an object or one of its snapshots. `None` when absent.
    /// Tombstones are surfaced through the returned metadata; the facade
    /// filters them.
    async fn load(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> BackendResult<Option<DataWithMetadata>>;

    /// Metadata of an object or one of its snapshots. `None` when absent.
    async fn get_metadata(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> BackendResult<Option<Metadata>>;

    /// All snapshots of a location, order unspecified.
    async fn find_snapshots(&self, loc: &Location) -> BackendResult<mpsc::Receiver<Snapshot>>;

    /// All objects in a container, optionally filtered to keys starting
    /// with `prefix`. Whether soft-deleted entries appear is backend
    /// policy; callers must not depend on either behavior.
    async fn find_files(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> BackendResult<mpsc::Receiver<LocationWithMetadata>>;

    /// Mark an object logically deleted, keeping bytes and snapshots.
    async fn soft_delete(&self, loc: &Location) -> BackendResult<()>;

    /// Remove an object and all of its snapshots.
    async fn permanent_delete(&self, loc: &Location) -> BackendResult<()>;

    /// Acquire an exclusive, time-bounded advisory lease. Returns `None`
    /// immediately when the location is already leased.
    async fn lock(&self, loc: &Location) -> BackendResult<Option<Lease>>;

    /// Create a container. Creating an existing container is a noop.
    async fn create_container(&self, name: &str) -> BackendResult<()>;

    /// Delete a container and everything in it.
    async fn delete_container(&self, name: &str) -> BackendResult<()>;
}
