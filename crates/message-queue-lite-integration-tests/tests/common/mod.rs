//! Common test utilities for message-queue-lite integration tests
//!
//! This module provides:
//! - A recording event sink
//! - Helpers for building queues whose lease monitor is driven by hand

use message_queue_lite::{
    EntrySnapshot, EventKind, MessageQueue, QueueEventSink, QueueName, QueueSettings,
};
use std::sync::{Arc, Mutex};

/// Monitor interval long enough that the background task never ticks during
/// a test
#[allow(dead_code)]
pub const MANUAL_MONITOR_INTERVAL_SECONDS: u64 = 1_000_000;

// ============================================================================
// Recording Sink
// ============================================================================

/// A single notification captured by [`RecordingSink`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub queue: QueueName,
    pub entry: EntrySnapshot,
}

/// Event sink that keeps every notification in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[allow(dead_code)]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    #[allow(dead_code)]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    fn record(&self, kind: EventKind, queue: &QueueName, entry: &EntrySnapshot) {
        self.events.lock().unwrap().push(RecordedEvent {
            kind,
            queue: queue.clone(),
            entry: entry.clone(),
        });
    }
}

impl QueueEventSink for RecordingSink {
    fn on_acknowledged(&self, queue: &QueueName, entry: &EntrySnapshot) {
        self.record(EventKind::Acknowledged, queue, entry);
    }

    fn on_lease_expired(&self, queue: &QueueName, entry: &EntrySnapshot) {
        self.record(EventKind::LeaseExpired, queue, entry);
    }

    fn on_discarded(&self, queue: &QueueName, entry: &EntrySnapshot) {
        self.record(EventKind::Discarded, queue, entry);
    }
}

// ============================================================================
// Queue Builders
// ============================================================================

#[allow(dead_code)]
pub fn queue_name(value: &str) -> QueueName {
    QueueName::new(value.to_string()).unwrap()
}

/// Settings whose lease monitor only runs when a test calls
/// `run_lease_monitor_pass`
#[allow(dead_code)]
pub fn manual_settings(lease_duration_seconds: u64, max_retry_count: u32) -> QueueSettings {
    QueueSettings {
        lease_duration_seconds,
        lease_monitoring_interval_seconds: MANUAL_MONITOR_INTERVAL_SECONDS,
        max_retry_count,
    }
}

/// Create a queue with a recording sink attached
#[allow(dead_code)]
pub fn recorded_queue(name: &str, settings: QueueSettings) -> (Arc<MessageQueue>, Arc<RecordingSink>) {
    let queue = Arc::new(MessageQueue::new(queue_name(name), settings).unwrap());
    let sink = RecordingSink::new();
    queue.subscribe(sink.clone());
    (queue, sink)
}
