#![warn(missing_docs)]

//! Sealstore secure store subsystem: the facade protocol over a blob
//! backend.
//!
//! Write path: metadata tagging → compress → encrypt → ID allocation →
//! (optimistic) save → backup/index queue fan-out
//! Read path:  load → tombstone filter → decrypt → decompress

pub mod error;
pub mod idgen;
pub mod options;
pub mod queue;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use idgen::{RangeIdGenerator, DEFAULT_RANGE_SIZE};
pub use options::SaveOptions;
pub use queue::{MemoryQueue, NotificationQueue, QueueMessage};
pub use store::{OptimisticOutcome, SaveReceipt, SecureStore, SecureStoreBuilder, StoreStats};
