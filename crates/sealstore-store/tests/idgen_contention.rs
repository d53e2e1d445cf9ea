//! Cross-instance ID generator tests: uniqueness under concurrency and the
//! retry budget under permanent contention.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sealstore_blob::{
    BackendResult, BlobBackend, DataWithMetadata, Lease, Location, LocationWithMetadata,
    MemoryBackend, Metadata, OptimisticWrite, Snapshot, SnapshotId,
};
use sealstore_store::{RangeIdGenerator, StoreError};

fn counter_loc() -> Location {
    Location::new("system", "ids/counter")
}

#[tokio::test]
async fn concurrent_generators_hand_out_distinct_ids() {
    const GENERATORS: usize = 3;
    const IDS_PER_GENERATOR: usize = 40;
    const RANGE_SIZE: u64 = 10;

    let backend = Arc::new(MemoryBackend::new());
    let mut tasks = Vec::new();
    for _ in 0..GENERATORS {
        let ids = Arc::new(RangeIdGenerator::with_range_size(
            backend.clone(),
            counter_loc(),
            RANGE_SIZE,
        ));
        tasks.push(tokio::spawn(async move {
            let mut out = Vec::with_capacity(IDS_PER_GENERATOR);
            for _ in 0..IDS_PER_GENERATOR {
                out.push(ids.next_id().await.unwrap());
            }
            out
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        let ids = task.await.unwrap();
        // Within one generator, IDs are strictly increasing.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        all.extend(ids);
    }

    let total = GENERATORS * IDS_PER_GENERATOR;
    let distinct: HashSet<i64> = all.iter().copied().collect();
    assert_eq!(distinct.len(), total);
    let bound = total as i64 + GENERATORS as i64 * RANGE_SIZE as i64;
    assert!(all.iter().all(|id| *id >= 1 && *id <= bound));
}

#[tokio::test]
async fn fresh_counter_hands_out_ids_from_one() {
    let backend = Arc::new(MemoryBackend::new());
    let ids = RangeIdGenerator::with_range_size(backend.clone(), counter_loc(), 10);
    let first: Vec<i64> = {
        let mut out = Vec::new();
        for _ in 0..10 {
            out.push(ids.next_id().await.unwrap());
        }
        out
    };
    assert_eq!(first, (1..=10).collect::<Vec<_>>());
    assert_eq!(backend.raw_bytes(&counter_loc()).unwrap(), b"10");
}

/// Delegates to an inner backend but makes every conditional write lose,
/// simulating a counter under permanent contention.
struct AlwaysContended {
    inner: MemoryBackend,
}

#[async_trait]
impl BlobBackend for AlwaysContended {
    async fn save(&self, loc: &Location, data: DataWithMetadata) -> BackendResult<Metadata> {
        self.inner.save(loc, data).await
    }

    async fn try_optimistic_write(
        &self,
        _loc: &Location,
        data: DataWithMetadata,
    ) -> BackendResult<OptimisticWrite> {
        // Drain the stream like a real backend would, then report the race
        // as lost.
        let _ = data.read_to_end().await?;
        Ok(OptimisticWrite::conflict())
    }

    async fn load(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> BackendResult<Option<DataWithMetadata>> {
        self.inner.load(loc, snapshot).await
    }

    async fn get_metadata(
        &self,
        loc: &Location,
        snapshot: Option<&SnapshotId>,
    ) -> BackendResult<Option<Metadata>> {
        self.inner.get_metadata(loc, snapshot).await
    }

    async fn find_snapshots(&self, loc: &Location) -> BackendResult<mpsc::Receiver<Snapshot>> {
        self.inner.find_snapshots(loc).await
    }

    async fn find_files(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> BackendResult<mpsc::Receiver<LocationWithMetadata>> {
        self.inner.find_files(container, prefix).await
    }

    async fn soft_delete(&self, loc: &Location) -> BackendResult<()> {
        self.inner.soft_delete(loc).await
    }

    async fn permanent_delete(&self, loc: &Location) -> BackendResult<()> {
        self.inner.permanent_delete(loc).await
    }

    async fn lock(&self, loc: &Location) -> BackendResult<Option<Lease>> {
        self.inner.lock(loc).await
    }

    async fn create_container(&self, name: &str) -> BackendResult<()> {
        self.inner.create_container(name).await
    }

    async fn delete_container(&self, name: &str) -> BackendResult<()> {
        self.inner.delete_container(name).await
    }
}

#[tokio::test]
async fn permanent_contention_exhausts_the_retry_budget() {
    let backend = Arc::new(AlwaysContended {
        inner: MemoryBackend::new(),
    });
    let ids = RangeIdGenerator::new(backend, counter_loc());
    assert!(matches!(
        ids.next_id().await,
        Err(StoreError::RangeAllocationFailed { attempts: 25 })
    ));
}
