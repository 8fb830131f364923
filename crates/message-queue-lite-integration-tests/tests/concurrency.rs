//! Concurrent producers, consumers and lease monitor passes.

mod common;

use common::{manual_settings, recorded_queue};
use message_queue_lite::{DeliveryTag, EventKind, SequenceGenerator};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_producers_and_consumers_deliver_every_message_exactly_once() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 250;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let (queue, sink) = recorded_queue("async-load", manual_settings(1800, 3));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut tags = Vec::with_capacity(PER_PRODUCER);
                for i in 0..PER_PRODUCER {
                    tags.push(queue.enqueue(format!("{}:{}", p, i).into_bytes()).unwrap());
                    tokio::task::yield_now().await;
                }
                tags
            })
        })
        .collect();

    let producers_done = Arc::new(AtomicBool::new(false));
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let producers_done = Arc::clone(&producers_done);
            tokio::spawn(async move {
                let mut received = Vec::new();
                loop {
                    // Read the flag before polling so an empty poll after it is final.
                    let done = producers_done.load(Ordering::Acquire);
                    match queue.dequeue() {
                        Some(envelope) => {
                            queue.acknowledge(envelope.delivery_tag);
                            received.push(envelope.delivery_tag);
                        }
                        None if done => break,
                        None => tokio::time::sleep(Duration::from_millis(1)).await,
                    }
                }
                received
            })
        })
        .collect();

    let mut produced: HashSet<DeliveryTag> = HashSet::new();
    for producer in producers {
        produced.extend(producer.await.unwrap());
    }
    producers_done.store(true, Ordering::Release);

    let mut consumed: HashSet<DeliveryTag> = HashSet::new();
    for consumer in consumers {
        for tag in consumer.await.unwrap() {
            assert!(consumed.insert(tag), "delivery tag {} seen twice", tag);
        }
    }

    assert_eq!(produced.len(), TOTAL);
    assert_eq!(consumed, produced);
    assert_eq!(sink.count(EventKind::Acknowledged), TOTAL);

    assert_eq!(queue.run_lease_monitor_pass().released, TOTAL);
    assert_eq!(queue.in_flight_count(), 0);
    assert_eq!(queue.ready_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manual_passes_racing_each_other_release_each_entry_once() {
    let (queue, sink) = recorded_queue("racing-passes", manual_settings(1800, 3));

    for i in 0..500 {
        queue.enqueue(format!("m{}", i).into_bytes()).unwrap();
    }
    while let Some(envelope) = queue.dequeue() {
        queue.acknowledge(envelope.delivery_tag);
    }

    let passes: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            tokio::task::spawn_blocking(move || queue.run_lease_monitor_pass().released)
        })
        .collect();

    let mut released = 0;
    for pass in passes {
        released += pass.await.unwrap();
    }

    assert_eq!(released, 500);
    assert_eq!(sink.count(EventKind::Acknowledged), 500);
    assert_eq!(queue.in_flight_count(), 0);
}

#[test]
fn test_sequence_generator_is_shared_safely_across_threads() {
    let generator = Arc::new(SequenceGenerator::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let generator = Arc::clone(&generator);
            std::thread::spawn(move || (0..1000).map(|_| generator.next_value()).collect::<Vec<_>>())
        })
        .collect();

    let mut values: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    values.sort_unstable();

    assert_eq!(values, (1..=8000).collect::<Vec<u64>>());
    assert_eq!(generator.current(), 8000);
}
