//! Post-write notification dispatch to backup and index queues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sealstore_blob::{Location, Metadata};

use crate::error::{StoreError, StoreResult};

/// Canonical notification payload. Field names are the wire contract:
/// `{"Container": str, "BasePath": str, "Id": int64|null, "Metadata": {str: str}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Container of the affected object.
    #[serde(rename = "Container")]
    pub container: String,
    /// Base path of the affected object.
    #[serde(rename = "BasePath")]
    pub base_path: String,
    /// Appended id, when the location carries one.
    #[serde(rename = "Id")]
    pub id: Option<i64>,
    /// Metadata stored with the object.
    #[serde(rename = "Metadata")]
    pub metadata: Metadata,
}

impl QueueMessage {
    /// Build the notification for a location and its stored metadata.
    pub fn new(loc: &Location, metadata: Metadata) -> Self {
        Self {
            container: loc.container().to_string(),
            base_path: loc.base_path().to_string(),
            id: loc.id(),
            metadata,
        }
    }
}

/// A queue the store fans notifications out to. Delivery is at-least-once;
/// implementations bring their own concurrency and retry policy.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Enqueue one message, acknowledging durable receipt.
    async fn send(&self, message: &QueueMessage) -> StoreResult<()>;
}

/// In-memory queue double collecting every message sent.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    messages: std::sync::Mutex<Vec<QueueMessage>>,
}

impl MemoryQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every message sent so far.
    pub fn sent(&self) -> Vec<QueueMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of messages sent so far.
    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether no messages have been sent.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    async fn send(&self, message: &QueueMessage) -> StoreResult<()> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(())
    }
}

/// Queue double that rejects every send, for error-path tests.
#[derive(Debug, Default)]
pub struct FailingQueue;

#[async_trait]
impl NotificationQueue for FailingQueue {
    async fn send(&self, _message: &QueueMessage) -> StoreResult<()> {
        Err(StoreError::QueueDispatch("queue unavailable".to_string()))
    }
}
