//! End-to-end lease lifecycle through the public API.

mod common;

use bytes::Bytes;
use common::{manual_settings, recorded_queue};
use message_queue_lite::{EventKind, QueueError, QueueSettings};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_consumer_that_never_acknowledges_sees_three_redeliveries_then_discard() {
    let (queue, sink) = recorded_queue("lifecycle", manual_settings(1800, 3));

    let tag = queue.enqueue(b"unlucky".to_vec()).unwrap();
    let mut elapsed_leases = Vec::new();

    while let Some(envelope) = queue.dequeue() {
        assert_eq!(envelope.delivery_tag, tag);
        assert_eq!(envelope.payload, Bytes::from_static(b"unlucky"));

        // Step the clock a minute at a time until the pass moves the entry.
        let mut waited = Duration::ZERO;
        loop {
            tokio::time::advance(Duration::from_secs(60)).await;
            waited += Duration::from_secs(60);
            if !queue.run_lease_monitor_pass().is_empty() {
                break;
            }
        }
        elapsed_leases.push(waited.as_secs());
    }

    assert_eq!(elapsed_leases, vec![1800, 1800, 3600, 5400]);
    assert_eq!(
        sink.kinds(),
        vec![
            EventKind::LeaseExpired,
            EventKind::LeaseExpired,
            EventKind::LeaseExpired,
            EventKind::Discarded,
        ]
    );
    assert_eq!(sink.count(EventKind::Acknowledged), 0);
    assert_eq!(queue.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_acknowledgement_on_redelivery_stops_further_retries() {
    let (queue, sink) = recorded_queue("ack-on-retry", manual_settings(30, 3));

    let tag = queue.enqueue(b"second time lucky".to_vec()).unwrap();
    queue.dequeue().unwrap();

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(queue.run_lease_monitor_pass().requeued, 1);

    let redelivered = queue.dequeue().unwrap();
    assert_eq!(redelivered.delivery_tag, tag);
    assert_eq!(redelivered.retry_count, 1);
    queue.acknowledge(tag);

    tokio::time::advance(Duration::from_secs(3600)).await;
    let sweep = queue.run_lease_monitor_pass();
    assert_eq!(sweep.released, 1);
    assert_eq!(sweep.requeued, 0);
    assert!(queue.dequeue().is_none());

    let events = sink.events();
    assert_eq!(
        sink.kinds(),
        vec![EventKind::LeaseExpired, EventKind::Acknowledged]
    );
    let acknowledged = &events[1].entry;
    assert!(acknowledged.acknowledged);
    assert_eq!(acknowledged.retry_count, 1);
    assert_eq!(events[1].queue.as_str(), "ack-on-retry");
    assert!(acknowledged.latest_enqueue_time >= acknowledged.original_enqueue_time);
}

#[tokio::test(start_paused = true)]
async fn test_interleaved_messages_keep_fifo_on_redelivery() {
    let (queue, _sink) = recorded_queue("interleaved", manual_settings(10, 3));

    queue.enqueue(b"first".to_vec()).unwrap();
    queue.enqueue(b"second".to_vec()).unwrap();
    let first = queue.dequeue().unwrap();
    queue.enqueue(b"third".to_vec()).unwrap();

    tokio::time::advance(Duration::from_secs(10)).await;
    queue.run_lease_monitor_pass();

    let order: Vec<Bytes> = std::iter::from_fn(|| queue.dequeue())
        .map(|e| e.payload)
        .collect();
    assert_eq!(
        order,
        vec![
            Bytes::from_static(b"second"),
            Bytes::from_static(b"third"),
            Bytes::from_static(b"first"),
        ]
    );
    assert_eq!(first.payload, Bytes::from_static(b"first"));
}

#[tokio::test(start_paused = true)]
async fn test_background_monitor_drives_redelivery_without_manual_passes() {
    let settings = QueueSettings {
        lease_duration_seconds: 5,
        lease_monitoring_interval_seconds: 2,
        max_retry_count: 1,
    };
    let (queue, sink) = recorded_queue("background", settings);

    queue.enqueue(b"auto".to_vec()).unwrap();
    queue.dequeue().unwrap();

    // Lease ends at 5s; the first tick at or after that is 6s.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(sink.kinds(), vec![EventKind::LeaseExpired]);

    queue.dequeue().unwrap();
    // Second delivery gets 5s * max(1, 1) = 5s; expires by the 12s tick.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(
        sink.kinds(),
        vec![EventKind::LeaseExpired, EventKind::Discarded]
    );

    queue.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_rejects_new_work_and_reports_closed_queue_name() {
    let (queue, sink) = recorded_queue("closing", manual_settings(1800, 3));
    queue.enqueue(b"pending".to_vec()).unwrap();

    queue.shutdown().await;

    match queue.enqueue(b"late".to_vec()) {
        Err(QueueError::QueueClosed { queue_name }) => assert_eq!(queue_name, "closing"),
        other => panic!("Expected QueueClosed, got {:?}", other),
    }
    assert!(queue.dequeue().is_none());
    assert_eq!(queue.subscriber_count(), 0);
    assert!(sink.events().is_empty());
}
