//! Crash-safe unique ID generation backed by the blob store.
//!
//! A generator claims contiguous ID ranges by conditionally incrementing a
//! counter blob: load the current high-water mark, propose `current +
//! range_size` under the loaded etag, and retry on conflict. Every claimed
//! range belongs to exactly one generator instance, so IDs are unique across
//! processes sharing the counter location.
//!
//! The counter blob is a bare UTF-8 decimal integer and always plaintext:
//! writes go straight to the backend, never through the store's codec
//! pipeline, so no configuration can encrypt or compress it. It must never
//! be soft-deleted.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use sealstore_blob::{BlobBackend, DataWithMetadata, Location, Metadata};

use crate::error::{StoreError, StoreResult};

/// Default number of IDs claimed per conditional write.
pub const DEFAULT_RANGE_SIZE: u64 = 10;

/// Conditional-write attempts before giving up under contention.
const CLAIM_ATTEMPTS: u32 = 25;

struct RangeState {
    /// Next ID to hand out.
    next: i64,
    /// Last ID of the claimed range; `next > last` means exhausted.
    last: i64,
}

/// Range-claim ID allocator over a shared counter blob.
pub struct RangeIdGenerator {
    backend: Arc<dyn BlobBackend>,
    counter_loc: Location,
    range_size: u64,
    state: Mutex<RangeState>,
}

impl RangeIdGenerator {
    /// Allocator with the default range size.
    pub fn new(backend: Arc<dyn BlobBackend>, counter_loc: Location) -> Self {
        Self::with_range_size(backend, counter_loc, DEFAULT_RANGE_SIZE)
    }

    /// Allocator claiming `range_size` IDs per conditional write. A larger
    /// range means fewer counter round-trips and larger gaps after a crash.
    pub fn with_range_size(
        backend: Arc<dyn BlobBackend>,
        counter_loc: Location,
        range_size: u64,
    ) -> Self {
        Self {
            backend,
            counter_loc,
            range_size: range_size.max(1),
            state: Mutex::new(RangeState { next: 1, last: 0 }),
        }
    }

    /// Where the counter blob lives.
    pub fn counter_location(&self) -> &Location {
        &self.counter_loc
    }

    /// IDs claimed per conditional write.
    pub fn range_size(&self) -> u64 {
        self.range_size
    }

    /// Hand out the next unique ID, claiming a fresh range from the counter
    /// blob when the current one is exhausted.
    pub async fn next_id(&self) -> StoreResult<i64> {
        let mut state = self.state.lock().await;
        if state.next <= state.last {
            let id = state.next;
            state.next += 1;
            return Ok(id);
        }

        for _ in 0..CLAIM_ATTEMPTS {
            let (current, etag) = self.read_counter().await?;
            let new_max = current + self.range_size as i64;
            let mut meta = Metadata::new();
            if let Some(etag) = etag {
                meta.set_etag(etag);
            }
            let body = DataWithMetadata::from_bytes(new_max.to_string().into_bytes(), meta);
            let outcome = self
                .backend
                .try_optimistic_write(&self.counter_loc, body)
                .await?;
            if outcome.ok {
                debug!(
                    counter = %self.counter_loc,
                    from = current + 1,
                    to = new_max,
                    "claimed ID range"
                );
                state.next = current + 2;
                state.last = new_max;
                return Ok(current + 1);
            }
            // Another allocator moved the counter; reload and retry.
        }
        Err(StoreError::RangeAllocationFailed {
            attempts: CLAIM_ATTEMPTS,
        })
    }

    /// Current counter value and its etag. An absent blob reads as 0 with
    /// no etag, which makes the subsequent write create-if-absent.
    async fn read_counter(&self) -> StoreResult<(i64, Option<String>)> {
        match self.backend.load(&self.counter_loc, None).await? {
            None => Ok((0, None)),
            Some(data) => {
                let (bytes, meta) = data.read_to_end().await?;
                let text = String::from_utf8(bytes).map_err(|_| {
                    StoreError::InvariantViolation(format!(
                        "counter blob {} is not valid UTF-8",
                        self.counter_loc
                    ))
                })?;
                let value = text.parse::<i64>().map_err(|_| {
                    StoreError::InvariantViolation(format!(
                        "counter blob {} does not hold a decimal integer: {text:?}",
                        self.counter_loc
                    ))
                })?;
                Ok((value, meta.etag().map(str::to_string)))
            }
        }
    }
}

impl std::fmt::Debug for RangeIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeIdGenerator")
            .field("counter_loc", &self.counter_loc)
            .field("range_size", &self.range_size)
            .finish_non_exhaustive()
    }
}
