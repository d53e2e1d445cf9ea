//! Backend-managed immutable object versions.

use serde::{Deserialize, Serialize};

/// Opaque snapshot identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Wrap a backend-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point-in-time version of a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The snapshot identifier.
    pub id: SnapshotId,
    /// When the snapshotted version was last modified, unix seconds.
    pub modified_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrips_as_string() {
        let id = SnapshotId::new("snap-17");
        assert_eq!(id.as_str(), "snap-17");
        assert_eq!(id.to_string(), "snap-17");
    }
}
