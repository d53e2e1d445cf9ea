//! Object metadata: an insertion-ordered string map with reserved keys and
//! first-class etag/snapshot version fields.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reserved metadata keys, stable on the wire.
pub mod keys {
    /// Present iff the payload bytes are compressed; value names the algorithm.
    pub const COMPRESSION: &str = "compression";
    /// Present iff the payload bytes are encrypted; value names the algorithm.
    pub const ENCRYPTION: &str = "encryption";
    /// Fully-qualified logical type name for typed object payloads.
    pub const TYPE: &str = "type";
    /// Backend-populated: payload length in bytes.
    pub const CONTENT_LENGTH: &str = "content-length";
    /// Backend-populated: last modification time, unix seconds.
    pub const MODIFIED: &str = "modified";
    /// Backend-populated: object size in bytes.
    pub const SIZE: &str = "size";
    /// Tombstone timestamp: the object is logically deleted but physically
    /// present. Load operations treat objects carrying this key as absent.
    pub const DELETED: &str = "leodeleted";
}

/// String-to-string object metadata.
///
/// Entries preserve insertion order for deterministic emission; equality is
/// by key/value set. The backend version fields (`etag`, `snapshot`) ride
/// alongside the map rather than in it, and are excluded from both equality
/// and serialization.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Vec<(String, String)>,
    etag: Option<String>,
    snapshot: Option<String>,
}

impl Metadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key` to `value`, replacing in place to preserve insertion order.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The opaque version token from the last backend write, if any.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Set the version token. On write, a present etag requests
    /// update-if-unchanged; an absent etag requests create-if-absent.
    pub fn set_etag(&mut self, etag: impl Into<String>) {
        self.etag = Some(etag.into());
    }

    /// Clear the version token.
    pub fn clear_etag(&mut self) {
        self.etag = None;
    }

    /// The snapshot identifier this metadata was read from or produced.
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Set the snapshot identifier.
    pub fn set_snapshot(&mut self, snapshot: impl Into<String>) {
        self.snapshot = Some(snapshot.into());
    }

    /// Compression algorithm tag, when the payload is compressed.
    pub fn compression(&self) -> Option<&str> {
        self.get(keys::COMPRESSION)
    }

    /// Encryption algorithm tag, when the payload is encrypted.
    pub fn encryption(&self) -> Option<&str> {
        self.get(keys::ENCRYPTION)
    }

    /// Logical type name of a typed object payload.
    pub fn type_name(&self) -> Option<&str> {
        self.get(keys::TYPE)
    }

    /// Backend-populated content length, when parseable.
    pub fn content_length(&self) -> Option<u64> {
        self.get(keys::CONTENT_LENGTH)?.parse().ok()
    }

    /// Backend-populated modification time (unix seconds), when parseable.
    pub fn modified(&self) -> Option<u64> {
        self.get(keys::MODIFIED)?.parse().ok()
    }

    /// Backend-populated size, when parseable.
    pub fn size(&self) -> Option<u64> {
        self.get(keys::SIZE)?.parse().ok()
    }

    /// Whether the tombstone marker is present.
    pub fn is_tombstoned(&self) -> bool {
        self.contains_key(keys::DELETED)
    }

    /// Stamp the tombstone marker with the given unix-seconds timestamp.
    pub fn mark_deleted(&mut self, timestamp_secs: u64) {
        self.set(keys::DELETED, timestamp_secs.to_string());
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        let mut a: Vec<_> = self.entries.iter().collect();
        let mut b: Vec<_> = other.entries.iter().collect();
        a.sort();
        b.sort();
        a == b
    }
}

impl Eq for Metadata {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut meta = Metadata::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetadataVisitor;

        impl<'de> Visitor<'de> for MetadataVisitor {
            type Value = Metadata;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a string-to-string map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Metadata, A::Error> {
                let mut meta = Metadata::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    meta.set(k, v);
                }
                Ok(meta)
            }
        }

        deserializer.deserialize_map(MetadataVisitor)
    }
}
