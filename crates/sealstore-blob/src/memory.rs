//! In-memory blob backend.
//!
//! Implements the full [`BlobBackend`] contract over process-local state:
//! containers, per-object snapshot chains, uuid etags, and an expiring lease
//! table. Serves as the workspace test double and as the reference for what
//! cloud bindings must do.
//!
//! Policy notes callers may not rely on: containers are created implicitly
//! on first save, and `find_files` includes soft-deleted entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BlobBackend, LocationWithMetadata, OptimisticWrite};
use crate::data::DataWithMetadata;
use crate::error::{BackendError, BackendResult};
use crate::lease::Lease;
use crate::location::Location;
use crate::metadata::{keys, Metadata};
use crate::snapshot::{Snapshot, SnapshotId};

const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(60);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Operation counters for the in-memory backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryBackendStats {
    /// Number of save operations.
    pub saves: u64,
    /// Number of conditional write attempts.
    pub optimistic_writes: u64,
    /// Conditional writes that lost the etag race.
    pub conflicts: u64,
    /// Number of load operations that returned data.
    pub loads: u64,
    /// Number of metadata reads.
    pub metadata_reads: u64,
    /// Number of soft deletes.
    pub soft_deletes: u64,
    /// Number of permanent deletes.
    pub permanent_deletes: u64,
    /// Leases granted.
    pub locks_granted: u64,
    /// Lease attempts refused because the location was already held.
    pub locks_contended: u64,
    /// Load streams handed out and not yet released.
    pub open_streams: u64,
}

#[derive(Clone)]
struct StoredVersion {
    id: String,
    modified_at: u64,
    data: Vec<u8>,
    metadata: Metadata,
}

struct StoredObject {
    data: Vec<u8>,
    metadata: Metadata,
    modified_at: u64,
    snapshots: Vec<StoredVersion>,
}

struct LeaseEntry {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryState {
    containers: HashMap<String, HashMap<String, StoredObject>>,
    leases: HashMap<(String, String), LeaseEntry>,
}

/// Process-local [`BlobBackend`] implementation.
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    stats: Arc<Mutex<MemoryBackendStats>>,
    lease_duration: Duration,
}

impl MemoryBackend {
    /// Backend with the default 60-second lease duration.
    pub fn new() -> Self {
        Self::with_lease_duration(DEFAULT_LEASE_DURATION)
    }

    /// Backend with a custom lease duration.
    pub fn with_lease_duration(lease_duration: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            stats: Arc::new(Mutex::new(MemoryBackendStats::default())),
            lease_duration,
        }
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> MemoryBackendStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Raw stored bytes for a location, bypassing all load semantics.
    /// Lets tests assert on the on-disk layout (framing, tombstones).
    pub fn raw_bytes(&self, loc: &Location) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let container = state.containers.get(loc.container())?;
        container.get(&loc.key()).map(|o| o.data.clone())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, MemoryBackendStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail with `Locked` when a live lease covers the location. Expired
    /// leases are purged here rather than by a background task.
    fn check_lease(state: &mut MemoryState, loc: &Location) -> BackendResult<()> {
        let lease_key = (loc.container().to_string(), loc.key());
        if let Some(entry) = state.leases.get(&lease_key) {
            if entry.expires_at > Instant::now() {
                return Err(BackendError::Locked(loc.clone()));
            }
            state.leases.remove(&lease_key);
        }
        Ok(())
    }

    fn store_version(
        container: &mut HashMap<String, StoredObject>,
        key: String,
        data: Vec<u8>,
        mut metadata: Metadata,
    ) -> Metadata {
        let now = now_secs();
        metadata.set(keys::CONTENT_LENGTH, data.len().to_string());
        metadata.set(keys::SIZE, data.len().to_string());
        metadata.set(keys::MODIFIED, now.to_string());
        metadata.set_etag(new_token());

        let snapshot_id = match container.get_mut(&key) {
            Some(existing) => {
                let snap = StoredVersion {
                    id: new_token(),
                    modified_at: existing.modified_at,
                    data: std::mem::take(&mut existing.data),
                    metadata: existing.metadata.clone(),
                };
                let id = snap.id.clone();
                existing.snapshots.push(snap);
                existing.data = data;
                existing.metadata = metadata.clone();
                existing.modified_at = now;
                Some(id)
            }
            None => {
                container.insert(
                    key,
                    StoredObject {
                        data,
                        metadata: metadata.clone(),
                        modified_at: now,
                        snapshots: Vec::new(),
                    },
                );
                None
            }
        };

        let mut result = metadata;
        if let Some(id) = snapshot_id {
            result.set_snapshot(id);
        }
        result
    }

    fn open_stream(&self, data: Vec<u8>, metadata: Metadata) -> DataWithMetadata {
        {
            let mut stats = self.lock_stats();
            stats.loads += 1;
            stats.open_streams += 1;
        }
        let stats = self.stats.clone();
        DataWithMetadata::with_release(
            Box::new(sealstore_codec::MemoryStream::new(data)),
            metadata,
            Box::new(move || {
                let mut stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.open_streams = stats.open_streams.saturating_sub(1);
            }),
        )
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn save(&self, loc: &Location, data: DataWithMetadata) -> BackendResult<Metadata> {
        let (bytes, metadata) = data.read_to_end().await?;
        let mut state = self.lock_state();
        Self::check_lease(&mut state, loc)?;
        let container = state
            .containers
            .entry(loc.container().to_string())
            .or_default();
        let result = Self::store_version(container, loc.key(), bytes, metadata);
        drop(state);
        self.lock_stats().saves += 1;
        debug!(loc = %loc, "saved object");
        Ok(result)
    }

    async fn try_optimistic_write(
        &self,
        loc: &Location,
        data: DataWithMetadata,
    ) -> BackendResult<OptimisticWrite> {
        let (bytes, metadata) = data.read_to_end().await?;
        let mut state = self.lock_state();
        Self::check_lease(&mut state, loc)?;
        let container = state
            .containers
            .entry(loc.container().to_string())
            .or_default();
        let key = loc.key();

        let matches = match (container.get(&key), metadata.etag()) {
            (Some(existing), Some(supplied)) => existing.metadata.etag() == Some(supplied),
            (Some(_), None) => false,
            (None, Some(_)) => false,
            (None, None) => true,
        };
        // The check and the store happen under one guard: two racing
        // writers must never both observe a matching etag.
        let applied = matches.then(|| Self::store_version(container, key, bytes, metadata));
        drop(state);

        let mut stats = self.lock_stats();
        stats.optimistic_writes += 1;
        match applied {
            Some(result) => Ok(OptimisticWrite::applied(result)),
            None => {
                stats.conflicts += 1;
                debug!(loc = %loc, "optimistic write lost the etag race");
                Ok(OptimisticWrite::conflict())
            }
        }
    }

    async fn load(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> BackendResult<Option<DataWithMetadata>> {
        let (data, metadata) = {
            let state = self.lock_state();
            let Some(object) = state
                .containers
                .get(loc.container())
                .and_then(|c| c.get(&loc.key()))
            else {
                return Ok(None);
            };
            match snapshot {
                Some(id) => {
                    let Some(version) = object.snapshots.iter().find(|s| s.id == id.as_str())
                    else {
                        return Ok(None);
                    };
                    let mut meta = version.metadata.clone();
                    meta.set_snapshot(version.id.clone());
                    (version.data.clone(), meta)
                }
                None => (object.data.clone(), object.metadata.clone()),
            }
        };
        Ok(Some(self.open_stream(data, metadata)))
    }

    async fn get_metadata(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> BackendResult<Option<Metadata>> {
        let state = self.lock_state();
        let metadata = state
            .containers
            .get(loc.container())
            .and_then(|c| c.get(&loc.key()))
            .and_then(|object| match snapshot {
                Some(id) => object
                    .snapshots
                    .iter()
                    .find(|s| s.id == id.as_str())
                    .map(|version| {
                        let mut meta = version.metadata.clone();
                        meta.set_snapshot(version.id.clone());
                        meta
                    }),
                None => Some(object.metadata.clone()),
            });
        drop(state);
        self.lock_stats().metadata_reads += 1;
        Ok(metadata)
    }

    async fn find_snapshots(&self, loc: &Location) -> BackendResult<mpsc::Receiver<Snapshot>> {
        let snapshots: Vec<Snapshot> = {
            let state = self.lock_state();
            state
                .containers
                .get(loc.container())
                .and_then(|c| c.get(&loc.key()))
                .map(|object| {
                    object
                        .snapshots
                        .iter()
                        .map(|s| Snapshot {
                            id: SnapshotId::new(s.id.clone()),
                            modified_at: s.modified_at,
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        let (tx, rx) = mpsc::channel(snapshots.len().max(1));
        for snapshot in snapshots {
            // Capacity covers every entry, so this cannot fail.
            let _ = tx.try_send(snapshot);
        }
        Ok(rx)
    }

    async fn find_files(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> BackendResult<mpsc::Receiver<LocationWithMetadata>> {
        let entries: Vec<LocationWithMetadata> = {
            let state = self.lock_state();
            let Some(objects) = state.containers.get(container) else {
                return Err(BackendError::ContainerNotFound(container.to_string()));
            };
            objects
                .iter()
                .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
                .map(|(key, object)| LocationWithMetadata {
                    location: Location::parse_key(container, key),
                    metadata: object.metadata.clone(),
                })
                .collect()
        };
        let (tx, rx) = mpsc::channel(entries.len().max(1));
        for entry in entries {
            let _ = tx.try_send(entry);
        }
        Ok(rx)
    }

    async fn soft_delete(&self, loc: &Location) -> BackendResult<()> {
        let mut state = self.lock_state();
        Self::check_lease(&mut state, loc)?;
        if let Some(object) = state
            .containers
            .get_mut(loc.container())
            .and_then(|c| c.get_mut(&loc.key()))
        {
            object.metadata.mark_deleted(now_secs());
            drop(state);
            self.lock_stats().soft_deletes += 1;
            debug!(loc = %loc, "soft-deleted object");
        }
        Ok(())
    }

    async fn permanent_delete(&self, loc: &Location) -> BackendResult<()> {
        let mut state = self.lock_state();
        Self::check_lease(&mut state, loc)?;
        let removed = state
            .containers
            .get_mut(loc.container())
            .and_then(|c| c.remove(&loc.key()));
        drop(state);
        if removed.is_some() {
            self.lock_stats().permanent_deletes += 1;
            debug!(loc = %loc, "permanently deleted object");
        }
        Ok(())
    }

    async fn lock(&self, loc: &Location) -> BackendResult<Option<Lease>> {
        let mut state = self.lock_state();
        let lease_key = (loc.container().to_string(), loc.key());
        if let Some(entry) = state.leases.get(&lease_key) {
            if entry.expires_at > Instant::now() {
                drop(state);
                self.lock_stats().locks_contended += 1;
                return Ok(None);
            }
            state.leases.remove(&lease_key);
        }

        let token = new_token();
        state.leases.insert(
            lease_key.clone(),
            LeaseEntry {
                token: token.clone(),
                expires_at: Instant::now() + self.lease_duration,
            },
        );
        drop(state);
        self.lock_stats().locks_granted += 1;

        let shared = self.state.clone();
        let hook_token = token.clone();
        let lease = Lease::new(
            loc.clone(),
            token,
            Box::new(move || {
                let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                // Only remove the entry this lease still owns; an expired
                // lease may have been re-granted to another holder.
                if state
                    .leases
                    .get(&lease_key)
                    .is_some_and(|e| e.token == hook_token)
                {
                    state.leases.remove(&lease_key);
                }
            }),
        );
        Ok(Some(lease))
    }

    async fn create_container(&self, name: &str) -> BackendResult<()> {
        self.lock_state()
            .containers
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_container(&self, name: &str) -> BackendResult<()> {
        let mut state = self.lock_state();
        state.containers.remove(name);
        state.leases.retain(|(container, _), _| container != name);
        Ok(())
    }
}
