//! In-process queue engine with lease-based at-least-once delivery.
//!
//! A [`MessageQueue`] keeps every message in exactly one of two places:
//!
//! - the **ready queue**, a lock-free FIFO of messages awaiting first or
//!   repeat delivery
//! - the **in-flight set**, a concurrent map from delivery tag to messages
//!   handed to a consumer and not yet settled
//!
//! A background lease monitor scans the in-flight set every
//! `lease_monitoring_interval`. Acknowledged messages are dropped, expired
//! ones are either requeued at the tail of the ready queue or discarded once
//! they run out of retries.
//!
//! # Examples
//!
//! ```rust
//! use message_queue_lite::{MessageQueue, QueueName, QueueSettings};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), message_queue_lite::QueueError> {
//! let name = QueueName::new("orders".to_string())?;
//! let queue = MessageQueue::new(name, QueueSettings::default())?;
//!
//! let tag = queue.enqueue(b"hello".to_vec())?;
//! let envelope = queue.dequeue().expect("message available");
//! assert_eq!(envelope.delivery_tag, tag);
//!
//! queue.acknowledge(envelope.delivery_tag);
//! queue.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::error::{QueueError, ValidationError};
use crate::events::{EventKind, QueueEventSink, SubscriberId, SubscriberRegistry};
use crate::message::{DeliveryTag, EntrySnapshot, MessageEnvelope, QueueName, QueueStatus, Timestamp};
use crate::sequence::SequenceGenerator;
use crate::settings::QueueSettings;
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message tracked by the queue with its delivery metadata
struct QueueEntry {
    delivery_tag: DeliveryTag,
    payload: Bytes,
    original_enqueue_time: Timestamp,
    latest_enqueue_time: Timestamp,
    dequeue_time: Option<Timestamp>,
    /// Monotonic lease start, set while the entry is in flight
    leased_at: Option<Instant>,
    retry_count: u32,
    acknowledged: bool,
}

impl QueueEntry {
    fn new(delivery_tag: DeliveryTag, payload: Bytes) -> Self {
        let now = Timestamp::now();
        Self {
            delivery_tag,
            payload,
            original_enqueue_time: now,
            latest_enqueue_time: now,
            dequeue_time: None,
            leased_at: None,
            retry_count: 0,
            acknowledged: false,
        }
    }

    /// Check if the current lease ran out at `now`
    fn is_lease_expired(&self, now: Instant, settings: &QueueSettings) -> bool {
        match self.leased_at {
            Some(leased_at) => {
                now.saturating_duration_since(leased_at) >= settings.allowed_lease(self.retry_count)
            }
            None => false,
        }
    }

    /// Check if the lease monitor should take the entry out of the in-flight set
    fn is_settled(&self, now: Instant, settings: &QueueSettings) -> bool {
        self.acknowledged || self.is_lease_expired(now, settings)
    }

    fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            delivery_tag: self.delivery_tag,
            retry_count: self.retry_count,
            acknowledged: self.acknowledged,
            payload: self.payload.clone(),
            original_enqueue_time: self.original_enqueue_time,
            latest_enqueue_time: self.latest_enqueue_time,
            dequeue_time: self.dequeue_time,
        }
    }

    fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            delivery_tag: self.delivery_tag,
            retry_count: self.retry_count,
            payload: self.payload.clone(),
        }
    }
}

/// Outcome counts of one lease monitor pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSweep {
    /// Acknowledged entries removed from the in-flight set
    pub released: usize,
    /// Expired entries moved back to the ready queue
    pub requeued: usize,
    /// Expired entries dropped after exhausting their retries
    pub discarded: usize,
}

impl LeaseSweep {
    /// Check if the pass changed nothing
    pub fn is_empty(&self) -> bool {
        self.released == 0 && self.requeued == 0 && self.discarded == 0
    }
}

/// State shared between the queue handle and its lease monitor task
struct QueueCore {
    name: QueueName,
    settings: QueueSettings,
    sequence: SequenceGenerator,
    ready_tx: Sender<QueueEntry>,
    ready_rx: Receiver<QueueEntry>,
    in_flight: DashMap<DeliveryTag, QueueEntry>,
    subscribers: SubscriberRegistry,
    /// Serialises lease monitor passes with each other and with shutdown
    sweep_gate: Mutex<()>,
    closed: AtomicBool,
    cleared: AtomicBool,
}

impl QueueCore {
    fn new(name: QueueName, settings: QueueSettings) -> Self {
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();
        Self {
            name,
            settings,
            sequence: SequenceGenerator::new(),
            ready_tx,
            ready_rx,
            in_flight: DashMap::new(),
            subscribers: SubscriberRegistry::new(),
            sweep_gate: Mutex::new(()),
            closed: AtomicBool::new(false),
            cleared: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the queue closed. Returns `true` if it was already closed.
    fn close(&self) -> bool {
        self.closed.swap(true, Ordering::SeqCst)
    }

    /// Drop everything in the ready queue
    fn drain_ready(&self) -> usize {
        self.ready_rx.try_iter().count()
    }

    fn push_ready(&self, entry: QueueEntry) {
        // The receiver lives as long as the core, so sending cannot fail.
        if let Err(rejected) = self.ready_tx.send(entry) {
            error!(
                queue_name = %self.name,
                delivery_tag = %rejected.0.delivery_tag,
                "Ready queue disconnected; message dropped"
            );
        }
    }

    /// Run one lease monitor pass.
    ///
    /// Candidates are collected from a snapshot of the in-flight set, then
    /// each is removed with `remove_if`, which re-evaluates "acknowledged or
    /// expired" while holding the entry's shard lock. Acknowledge updates the
    /// flag under the same lock, so the flag read here is final: an entry
    /// acknowledged before removal is released, and once removed the tag is
    /// unknown and a late acknowledgement is a no-op.
    #[instrument(skip(self), fields(queue_name = %self.name))]
    fn sweep_leases(&self) -> LeaseSweep {
        let _gate = self
            .sweep_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut sweep = LeaseSweep::default();
        if self.is_closed() {
            return sweep;
        }

        let now = Instant::now();
        let candidates: Vec<DeliveryTag> = self
            .in_flight
            .iter()
            .filter(|entry| entry.is_settled(now, &self.settings))
            .map(|entry| *entry.key())
            .collect();

        for tag in candidates {
            let Some((_, mut entry)) = self
                .in_flight
                .remove_if(&tag, |_, entry| entry.is_settled(now, &self.settings))
            else {
                continue;
            };

            if entry.acknowledged {
                sweep.released += 1;
                continue;
            }

            if entry.retry_count < self.settings.max_retry_count {
                entry.retry_count += 1;
                entry.latest_enqueue_time = Timestamp::now();
                entry.leased_at = None;

                let snapshot = entry.snapshot();
                self.push_ready(entry);
                sweep.requeued += 1;

                debug!(
                    delivery_tag = %tag,
                    retry_count = snapshot.retry_count,
                    "Lease expired; message requeued"
                );
                self.subscribers
                    .notify(EventKind::LeaseExpired, &self.name, &snapshot);
            } else {
                let snapshot = entry.snapshot();
                sweep.discarded += 1;

                warn!(
                    delivery_tag = %tag,
                    retry_count = snapshot.retry_count,
                    "Lease expired with no retries left; message discarded"
                );
                self.subscribers
                    .notify(EventKind::Discarded, &self.name, &snapshot);
            }
        }

        if !sweep.is_empty() {
            info!(
                released = sweep.released,
                requeued = sweep.requeued,
                discarded = sweep.discarded,
                "Lease monitor pass completed"
            );
        }

        sweep
    }

    /// Drop all state. Waits for any running monitor pass first.
    ///
    /// Must only be called after `close`. Passes started after that point
    /// return without touching state, so once the gate is held no further
    /// lease notification can fire.
    fn clear(&self) {
        let _gate = self
            .sweep_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let dropped_ready = self.drain_ready();
        let dropped_in_flight = self.in_flight.len();
        self.in_flight.clear();
        self.subscribers.clear();

        if self.cleared.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(
            queue_name = %self.name,
            dropped_ready = dropped_ready,
            dropped_in_flight = dropped_in_flight,
            "Queue shut down"
        );
    }
}

// ============================================================================
// Lease Monitor
// ============================================================================

/// Handle to the background task running periodic lease monitor passes
struct LeaseMonitor {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LeaseMonitor {
    fn spawn(core: Arc<QueueCore>) -> Result<Self, QueueError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| QueueError::RuntimeUnavailable)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(run_lease_monitor(core, shutdown_rx));

        Ok(Self {
            shutdown_tx,
            handle,
        })
    }
}

async fn run_lease_monitor(core: Arc<QueueCore>, mut shutdown: watch::Receiver<bool>) {
    let period = core.settings.lease_monitoring_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        queue_name = %core.name,
        interval_seconds = period.as_secs(),
        "Lease monitor started"
    );

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                core.sweep_leases();
            }
        }
    }

    debug!(queue_name = %core.name, "Lease monitor stopped");
}

// ============================================================================
// MessageQueue
// ============================================================================

/// A named queue with at-least-once delivery.
///
/// `enqueue`, `dequeue` and `acknowledge` never block and may be called
/// from any number of threads. The lease monitor runs on the Tokio runtime
/// that was current when the queue was created.
pub struct MessageQueue {
    core: Arc<QueueCore>,
    monitor: Mutex<Option<LeaseMonitor>>,
}

impl MessageQueue {
    /// Create a queue and start its lease monitor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(name: QueueName, settings: QueueSettings) -> Result<Self, QueueError> {
        settings.validate()?;

        let core = Arc::new(QueueCore::new(name, settings));
        let monitor = LeaseMonitor::spawn(Arc::clone(&core))?;

        info!(
            queue_name = %core.name,
            lease_duration_seconds = core.settings.lease_duration_seconds,
            lease_monitoring_interval_seconds = core.settings.lease_monitoring_interval_seconds,
            max_retry_count = core.settings.max_retry_count,
            "Queue created"
        );

        Ok(Self {
            core,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    /// Queue name
    pub fn name(&self) -> &QueueName {
        &self.core.name
    }

    /// Settings the queue was created with
    pub fn settings(&self) -> &QueueSettings {
        &self.core.settings
    }

    /// Append a message to the tail of the ready queue.
    ///
    /// Returns the delivery tag assigned to the message. Fails with
    /// [`QueueError::InvalidArgument`] for an empty payload and with
    /// [`QueueError::QueueClosed`] after shutdown.
    pub fn enqueue(&self, payload: impl Into<Bytes>) -> Result<DeliveryTag, QueueError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(ValidationError::Required {
                field: "payload".to_string(),
            }
            .into());
        }

        if self.core.is_closed() {
            return Err(QueueError::QueueClosed {
                queue_name: self.core.name.to_string(),
            });
        }

        let tag = DeliveryTag::new(self.core.sequence.next_value());
        self.core.push_ready(QueueEntry::new(tag, payload));

        // Shutdown may have drained the ready queue between the check above
        // and the push.
        if self.core.is_closed() {
            self.core.drain_ready();
            return Err(QueueError::QueueClosed {
                queue_name: self.core.name.to_string(),
            });
        }

        debug!(queue_name = %self.core.name, delivery_tag = %tag, "Message enqueued");
        Ok(tag)
    }

    /// Take the message at the head of the ready queue and lease it.
    ///
    /// Returns `None` when no message is ready. Never waits.
    pub fn dequeue(&self) -> Option<MessageEnvelope> {
        if self.core.is_closed() {
            return None;
        }

        let mut entry = self.core.ready_rx.try_recv().ok()?;
        entry.dequeue_time = Some(Timestamp::now());
        entry.leased_at = Some(Instant::now());

        let envelope = entry.envelope();
        self.core.in_flight.insert(entry.delivery_tag, entry);

        if self.core.is_closed() {
            self.core.in_flight.remove(&envelope.delivery_tag);
            return None;
        }

        debug!(
            queue_name = %self.core.name,
            delivery_tag = %envelope.delivery_tag,
            retry_count = envelope.retry_count,
            "Message dequeued"
        );
        Some(envelope)
    }

    /// Take up to `max_messages` messages from the head of the ready queue
    /// and lease each of them.
    ///
    /// Returns fewer messages, possibly none, when the ready queue runs dry.
    /// Never waits.
    pub fn dequeue_batch(&self, max_messages: usize) -> Vec<MessageEnvelope> {
        let batch: Vec<MessageEnvelope> = std::iter::from_fn(|| self.dequeue())
            .take(max_messages)
            .collect();

        if !batch.is_empty() {
            debug!(
                queue_name = %self.core.name,
                requested = max_messages,
                delivered = batch.len(),
                "Message batch dequeued"
            );
        }
        batch
    }

    /// Mark an in-flight message as acknowledged.
    ///
    /// Unknown tags and repeated acknowledgements are ignored: a lease may
    /// legitimately expire just before the consumer acknowledges. The next
    /// lease monitor pass removes the acknowledged message.
    pub fn acknowledge(&self, delivery_tag: DeliveryTag) {
        let snapshot = {
            let Some(mut entry) = self.core.in_flight.get_mut(&delivery_tag) else {
                debug!(
                    queue_name = %self.core.name,
                    delivery_tag = %delivery_tag,
                    "Acknowledgement for unknown delivery tag ignored"
                );
                return;
            };

            if entry.acknowledged {
                return;
            }

            entry.acknowledged = true;
            entry.snapshot()
        };

        debug!(
            queue_name = %self.core.name,
            delivery_tag = %delivery_tag,
            "Message acknowledged"
        );
        self.core
            .subscribers
            .notify(EventKind::Acknowledged, &self.core.name, &snapshot);
    }

    /// Run one lease monitor pass now instead of waiting for the timer.
    ///
    /// Passes never overlap; a call made while the background monitor is
    /// mid-pass waits for it to finish.
    pub fn run_lease_monitor_pass(&self) -> LeaseSweep {
        self.core.sweep_leases()
    }

    /// Register a sink for lifecycle events
    pub fn subscribe(&self, sink: Arc<dyn QueueEventSink>) -> SubscriberId {
        self.core.subscribers.subscribe(sink)
    }

    /// Remove a previously registered sink. Returns `false` if it was not
    /// registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.core.subscribers.unsubscribe(id)
    }

    /// Number of registered sinks
    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.len()
    }

    /// Messages waiting for delivery
    pub fn ready_count(&self) -> usize {
        self.core.ready_rx.len()
    }

    /// Messages delivered and not yet removed by the lease monitor
    pub fn in_flight_count(&self) -> usize {
        self.core.in_flight.len()
    }

    /// Current counts for the queue
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            queue_name: self.core.name.to_string(),
            ready_count: self.ready_count(),
            in_flight_count: self.in_flight_count(),
        }
    }

    /// Check if `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.core.is_closed()
    }

    /// Stop the lease monitor and drop all queue state.
    ///
    /// Waits for a monitor pass in progress to finish, so no lease
    /// notification fires after this returns. Both collections are cleared
    /// and every sink is detached. Every caller waits, including concurrent
    /// and repeated ones.
    pub async fn shutdown(&self) {
        self.core.close();

        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(monitor) = monitor {
            // The receiver may already be gone if the task ended early.
            let _ = monitor.shutdown_tx.send(true);
            if let Err(e) = monitor.handle.await {
                if !e.is_cancelled() {
                    error!(queue_name = %self.core.name, error = %e, "Lease monitor task failed");
                }
            }
        }

        // A manual pass may hold the gate for as long as its sinks run.
        let core = Arc::clone(&self.core);
        if let Err(e) = tokio::task::spawn_blocking(move || core.clear()).await {
            error!(queue_name = %self.core.name, error = %e, "Queue teardown failed");
        }
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        let monitor = self
            .monitor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(monitor) = monitor {
            self.core.close();
            let _ = monitor.shutdown_tx.send(true);
            monitor.handle.abort();
        }
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("name", &self.core.name)
            .field("settings", &self.core.settings)
            .field("ready_count", &self.ready_count())
            .field("in_flight_count", &self.in_flight_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
