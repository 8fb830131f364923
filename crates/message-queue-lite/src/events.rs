//! Lifecycle notifications for queue entries.
//!
//! A queue reports three lifecycle outcomes to registered sinks:
//!
//! - **Acknowledged**: a consumer acknowledged an in-flight message
//! - **Lease expired**: a lease ran out and the message was requeued
//! - **Discarded**: a lease ran out and the message had no retries left
//!
//! Sinks are invoked synchronously on the thread performing the operation
//! (the acknowledging caller or the lease monitor) and always receive a
//! complete, immutable [`EntrySnapshot`]. Sinks are the only way to observe
//! discards; a queue never reports them as errors.
//!
//! # Examples
//!
//! ```rust
//! use message_queue_lite::events::{QueueEventSink, NoOpEventSink};
//! use std::sync::Arc;
//!
//! let sink: Arc<dyn QueueEventSink> = Arc::new(NoOpEventSink);
//! ```

use crate::message::{EntrySnapshot, QueueName};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Observer of queue entry lifecycle events.
///
/// # Thread Safety
///
/// All methods take `&self` and may be called concurrently from consumer
/// threads and the lease monitor. Implementations must be thread-safe.
///
/// # Faults
///
/// A panicking sink is caught and logged. It does not stop delivery to other
/// sinks or the processing of other entries.
pub trait QueueEventSink: Send + Sync {
    /// Called once when an in-flight message is first acknowledged.
    fn on_acknowledged(&self, queue: &QueueName, entry: &EntrySnapshot);

    /// Called when a lease expired and the message went back to the ready
    /// queue. `entry.retry_count` is the already incremented count.
    fn on_lease_expired(&self, queue: &QueueName, entry: &EntrySnapshot);

    /// Called when a lease expired and the message was dropped for good.
    fn on_discarded(&self, queue: &QueueName, entry: &EntrySnapshot);
}

/// Sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl QueueEventSink for NoOpEventSink {
    fn on_acknowledged(&self, _queue: &QueueName, _entry: &EntrySnapshot) {}

    fn on_lease_expired(&self, _queue: &QueueName, _entry: &EntrySnapshot) {}

    fn on_discarded(&self, _queue: &QueueName, _entry: &EntrySnapshot) {}
}

/// Sink that writes each event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl QueueEventSink for TracingEventSink {
    fn on_acknowledged(&self, queue: &QueueName, entry: &EntrySnapshot) {
        info!(
            queue_name = %queue,
            delivery_tag = %entry.delivery_tag,
            retry_count = entry.retry_count,
            "Message acknowledged"
        );
    }

    fn on_lease_expired(&self, queue: &QueueName, entry: &EntrySnapshot) {
        warn!(
            queue_name = %queue,
            delivery_tag = %entry.delivery_tag,
            retry_count = entry.retry_count,
            "Message lease expired; requeued"
        );
    }

    fn on_discarded(&self, queue: &QueueName, entry: &EntrySnapshot) {
        warn!(
            queue_name = %queue,
            delivery_tag = %entry.delivery_tag,
            retry_count = entry.retry_count,
            payload_len = entry.payload.len(),
            "Message discarded after exhausting retries"
        );
    }
}

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Acknowledged,
    LeaseExpired,
    Discarded,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Acknowledged => "acknowledged",
            Self::LeaseExpired => "lease_expired",
            Self::Discarded => "discarded",
        };
        write!(f, "{}", name)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of sinks registered on one queue
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    sinks: RwLock<HashMap<SubscriberId, Arc<dyn QueueEventSink>>>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, sink: Arc<dyn QueueEventSink>) -> SubscriberId {
        let id = SubscriberId::new();
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sink);
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub(crate) fn clear(&self) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver one event to every sink.
    ///
    /// The sink list is copied before dispatch so sinks may subscribe or
    /// unsubscribe from inside a callback.
    pub(crate) fn notify(&self, kind: EventKind, queue: &QueueName, entry: &EntrySnapshot) {
        let sinks: Vec<(SubscriberId, Arc<dyn QueueEventSink>)> = {
            let guard = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
            if guard.is_empty() {
                return;
            }
            guard
                .iter()
                .map(|(id, sink)| (*id, Arc::clone(sink)))
                .collect()
        };

        for (id, sink) in sinks {
            let outcome = catch_unwind(AssertUnwindSafe(|| match kind {
                EventKind::Acknowledged => sink.on_acknowledged(queue, entry),
                EventKind::LeaseExpired => sink.on_lease_expired(queue, entry),
                EventKind::Discarded => sink.on_discarded(queue, entry),
            }));

            if outcome.is_err() {
                error!(
                    queue_name = %queue,
                    subscriber_id = %id,
                    delivery_tag = %entry.delivery_tag,
                    event = %kind,
                    "Event sink panicked; continuing with remaining sinks"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
