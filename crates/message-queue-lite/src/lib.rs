//! # Message Queue Lite
//!
//! In-process, at-least-once message queue. Producers enqueue opaque
//! payloads, consumers dequeue them under a lease, and a message whose lease
//! expires before it is acknowledged is redelivered until it runs out of
//! retries.
//!
//! This library provides:
//! - A concurrent queue engine with lease tracking and linear lease backoff
//! - Lifecycle notifications (acknowledged, lease expired, discarded)
//! - A thin registry mapping queue names to queue instances
//! - A serialization boundary for typed producers and consumers
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Identifiers, envelopes and snapshots
//! - [`sequence`] - Delivery tag generation
//! - [`settings`] - Queue settings and configuration loading
//! - [`events`] - Event sink trait and built-in sinks
//! - [`queue`] - The queue engine and lease monitor
//! - [`manager`] - Registry of named queues
//! - [`serialization`] - Payload serializers and typed queue wrapper
//!
//! State lives in memory only; nothing survives process exit.

// Module declarations
pub mod error;
pub mod events;
pub mod manager;
pub mod message;
pub mod queue;
pub mod sequence;
pub mod serialization;
pub mod settings;

// Re-export commonly used types at crate root for convenience
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use events::{EventKind, NoOpEventSink, QueueEventSink, SubscriberId, TracingEventSink};
pub use manager::QueueManager;
pub use message::{DeliveryTag, EntrySnapshot, MessageEnvelope, QueueName, QueueStatus, Timestamp};
pub use queue::{LeaseSweep, MessageQueue};
pub use sequence::SequenceGenerator;
pub use serialization::{JsonMessageSerializer, MessageSerializer, TypedEnvelope, TypedQueue};
pub use settings::QueueSettings;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
