//! Registry of named queues.
//!
//! [`QueueManager`] maps each [`QueueName`] to one [`MessageQueue`]
//! instance. It owns no delivery logic; it only creates, looks up, reports on
//! and shuts down queues.
//!
//! # Examples
//!
//! ```rust
//! use message_queue_lite::{QueueManager, QueueName, QueueSettings};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), message_queue_lite::QueueError> {
//! let manager = QueueManager::new(QueueSettings::default());
//! let name = QueueName::new("orders".to_string())?;
//!
//! let queue = manager.create_queue(name.clone(), None)?;
//! queue.enqueue(b"payload".to_vec())?;
//! assert_eq!(manager.message_count(&name)?, 1);
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::error::QueueError;
use crate::message::{QueueName, QueueStatus};
use crate::queue::MessageQueue;
use crate::settings::QueueSettings;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Registry mapping queue names to queue instances.
///
/// All values are stored as `Arc<MessageQueue>` so callers can keep using a
/// queue handle while the registry changes.
pub struct QueueManager {
    default_settings: QueueSettings,
    queues: DashMap<QueueName, Arc<MessageQueue>>,
}

impl QueueManager {
    /// Create an empty registry. `default_settings` apply to queues created
    /// without explicit settings.
    pub fn new(default_settings: QueueSettings) -> Self {
        Self {
            default_settings,
            queues: DashMap::new(),
        }
    }

    /// Settings used when `create_queue` receives `None`
    pub fn default_settings(&self) -> &QueueSettings {
        &self.default_settings
    }

    /// Create and register a new queue.
    ///
    /// Fails with [`QueueError::QueueAlreadyExists`] if the name is taken.
    pub fn create_queue(
        &self,
        name: QueueName,
        settings: Option<QueueSettings>,
    ) -> Result<Arc<MessageQueue>, QueueError> {
        match self.queues.entry(name.clone()) {
            Entry::Occupied(_) => Err(QueueError::QueueAlreadyExists {
                queue_name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                let settings = settings.unwrap_or_else(|| self.default_settings.clone());
                let queue = Arc::new(MessageQueue::new(name, settings)?);
                slot.insert(Arc::clone(&queue));
                Ok(queue)
            }
        }
    }

    /// Get a queue, creating it with the default settings if missing
    pub fn get_or_create_queue(&self, name: &QueueName) -> Result<Arc<MessageQueue>, QueueError> {
        match self.queues.entry(name.clone()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                let queue = Arc::new(MessageQueue::new(
                    name.clone(),
                    self.default_settings.clone(),
                )?);
                slot.insert(Arc::clone(&queue));
                Ok(queue)
            }
        }
    }

    /// Look up a registered queue
    pub fn get_queue(&self, name: &QueueName) -> Result<Arc<MessageQueue>, QueueError> {
        self.queues
            .get(name)
            .map(|queue| Arc::clone(queue.value()))
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }

    /// Check whether a queue is registered
    pub fn contains(&self, name: &QueueName) -> bool {
        self.queues.contains_key(name)
    }

    /// Unregister a queue and shut it down.
    ///
    /// Messages still held by the queue are dropped.
    pub async fn delete_queue(&self, name: &QueueName) -> Result<(), QueueError> {
        let (_, queue) = self
            .queues
            .remove(name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })?;

        queue.shutdown().await;
        info!(queue_name = %name, "Queue deleted");
        Ok(())
    }

    /// Counts for a registered queue
    pub fn queue_status(&self, name: &QueueName) -> Result<QueueStatus, QueueError> {
        Ok(self.get_queue(name)?.status())
    }

    /// Messages waiting for delivery in a registered queue
    pub fn message_count(&self, name: &QueueName) -> Result<usize, QueueError> {
        Ok(self.get_queue(name)?.ready_count())
    }

    /// Messages delivered but not yet settled in a registered queue
    pub fn unacknowledged_count(&self, name: &QueueName) -> Result<usize, QueueError> {
        Ok(self.get_queue(name)?.in_flight_count())
    }

    /// Names of all registered queues, sorted
    pub fn queue_names(&self) -> Vec<QueueName> {
        let mut names: Vec<QueueName> = self.queues.iter().map(|q| q.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered queues
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Check if no queues are registered
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Unregister and shut down every queue
    pub async fn shutdown(&self) {
        for name in self.queue_names() {
            if let Some((_, queue)) = self.queues.remove(&name) {
                queue.shutdown().await;
            }
        }
        info!("Queue manager shut down");
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("default_settings", &self.default_settings)
            .field("queues", &self.queue_names())
            .finish()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
