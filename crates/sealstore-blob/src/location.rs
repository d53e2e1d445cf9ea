//! Object addressing: `(container, base_path, id?)`.

use serde::{Deserialize, Serialize};

/// Address of an object: a container, a base path, and an optional 64-bit
/// id appended to the key. Keys are opaque strings to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    container: String,
    base_path: String,
    id: Option<i64>,
}

impl Location {
    /// Address without an id.
    pub fn new(container: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            base_path: base_path.into(),
            id: None,
        }
    }

    /// Address with an id.
    pub fn with_id(container: impl Into<String>, base_path: impl Into<String>, id: i64) -> Self {
        Self {
            container: container.into(),
            base_path: base_path.into(),
            id: Some(id),
        }
    }

    /// The container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// The base path within the container.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The optional appended id.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// A copy of this location with `id` assigned.
    pub fn assign_id(&self, id: i64) -> Self {
        Self {
            container: self.container.clone(),
            base_path: self.base_path.clone(),
            id: Some(id),
        }
    }

    /// The rendered storage key: the base path, with the id joined by `/`
    /// when present.
    pub fn key(&self) -> String {
        match self.id {
            Some(id) if self.base_path.is_empty() => id.to_string(),
            Some(id) => format!("{}/{}", self.base_path, id),
            None => self.base_path.clone(),
        }
    }

    /// Reconstruct a location from a listed key: a trailing decimal segment
    /// becomes the id, anything else is all base path.
    pub fn parse_key(container: impl Into<String>, key: &str) -> Self {
        if let Some((base, tail)) = key.rsplit_once('/') {
            if let Ok(id) = tail.parse::<i64>() {
                return Self {
                    container: container.into(),
                    base_path: base.to_string(),
                    id: Some(id),
                };
            }
        } else if let Ok(id) = key.parse::<i64>() {
            return Self {
                container: container.into(),
                base_path: String::new(),
                id: Some(id),
            };
        }
        Self {
            container: container.into(),
            base_path: key.to_string(),
            id: None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.container, self.key())
    }
}
