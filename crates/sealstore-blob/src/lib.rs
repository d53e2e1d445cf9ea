#![warn(missing_docs)]

//! Sealstore blob subsystem: object addressing, metadata model, the pluggable
//! blob backend contract (conditional writes, snapshots, soft deletion,
//! leases), and an in-memory backend used as the workspace test double.

pub mod backend;
pub mod data;
pub mod error;
pub mod lease;
pub mod location;
pub mod memory;
pub mod metadata;
pub mod snapshot;

pub use backend::{BlobBackend, LocationWithMetadata, OptimisticWrite};
pub use data::DataWithMetadata;
pub use error::{BackendError, BackendResult};
pub use lease::Lease;
pub use location::Location;
pub use memory::{MemoryBackend, MemoryBackendStats};
pub use metadata::{keys, Metadata};
pub use snapshot::{Snapshot, SnapshotId};
