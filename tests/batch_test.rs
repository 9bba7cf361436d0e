mod common;

use std::time::Duration;

use common::{event, RecordingTransport};
use error_sentinel::{BatchScheduler, ConfigError, DeliveryError};
use tokio::sync::mpsc::error::TryRecvError;

const INTERVAL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn test_full_batch_is_sent_immediately() {
    let (transport, mut rx) = RecordingTransport::new();
    let scheduler = BatchScheduler::new(transport, 3, INTERVAL).unwrap();

    assert!(scheduler.enqueue(event("/a", 1)));
    assert!(scheduler.enqueue(event("/b", 2)));
    assert!(scheduler.is_timer_armed());
    assert!(scheduler.enqueue(event("/c", 3)));

    assert_eq!(scheduler.pending(), 0);
    assert!(!scheduler.is_timer_armed());

    let batch = rx.recv().await.unwrap();
    let endpoints: Vec<&str> = batch.errors.iter().map(|e| e.endpoint.as_str()).collect();
    assert_eq!(endpoints, vec!["/a", "/b", "/c"]);
}

#[tokio::test(start_paused = true)]
async fn test_partial_batch_waits_for_the_timer() {
    let (transport, mut rx) = RecordingTransport::new();
    let scheduler = BatchScheduler::new(transport, 50, INTERVAL).unwrap();

    scheduler.enqueue(event("/a", 1));
    scheduler.enqueue(event("/b", 2));
    assert_eq!(scheduler.pending(), 2);
    assert!(scheduler.is_timer_armed());

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(scheduler.pending(), 2);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    let batch = rx.recv().await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(scheduler.pending(), 0);
    assert!(!scheduler.is_timer_armed());
}

#[tokio::test(start_paused = true)]
async fn test_manual_flush_sends_queue_and_cancels_timer() {
    let (transport, mut rx) = RecordingTransport::new();
    let scheduler = BatchScheduler::new(transport, 50, INTERVAL).unwrap();

    scheduler.enqueue(event("/a", 1));
    scheduler.enqueue(event("/b", 2));

    assert_eq!(scheduler.flush(), 2);
    assert!(!scheduler.is_timer_armed());
    assert_eq!(rx.recv().await.unwrap().len(), 2);

    // The cancelled timer must not produce a second batch.
    tokio::time::sleep(INTERVAL * 3).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    assert_eq!(scheduler.flush(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_events_enqueued_after_swap_go_to_next_batch() {
    let (transport, mut rx) = RecordingTransport::new();
    let scheduler = BatchScheduler::new(transport, 50, INTERVAL).unwrap();

    scheduler.enqueue(event("/first", 1));
    scheduler.flush();
    scheduler.enqueue(event("/second", 2));
    assert_eq!(scheduler.pending(), 1);
    assert!(scheduler.is_timer_armed());

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.errors[0].endpoint, "/first");
    assert_eq!(second.errors[0].endpoint, "/second");
    assert_eq!(first.len() + second.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_is_not_requeued() {
    let (transport, mut rx) = RecordingTransport::failing(DeliveryError::Status(503));
    let scheduler = BatchScheduler::new(transport, 50, INTERVAL).unwrap();

    scheduler.enqueue(event("/a", 1));
    assert_eq!(scheduler.flush(), 1);
    assert_eq!(rx.recv().await.unwrap().len(), 1);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(scheduler.pending(), 0);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_queue_without_sending() {
    let (transport, mut rx) = RecordingTransport::new();
    let scheduler = BatchScheduler::new(transport, 50, INTERVAL).unwrap();

    scheduler.enqueue(event("/a", 1));
    scheduler.enqueue(event("/b", 2));

    assert_eq!(scheduler.shutdown(), 2);
    assert!(!scheduler.is_timer_armed());
    assert!(!scheduler.enqueue(event("/c", 3)));

    tokio::time::sleep(INTERVAL * 3).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn test_only_one_timer_is_armed_per_window() {
    let (transport, mut rx) = RecordingTransport::new();
    let scheduler = BatchScheduler::new(transport, 50, INTERVAL).unwrap();

    scheduler.enqueue(event("/a", 1));
    tokio::time::sleep(Duration::from_secs(5)).await;
    scheduler.enqueue(event("/b", 2));

    // Both go out when the first timer fires, not ten seconds after "/b".
    tokio::time::sleep(Duration::from_secs(6)).await;
    let batch = rx.try_recv().unwrap();
    assert_eq!(batch.len(), 2);
}

#[test]
fn test_scheduler_outside_runtime_is_rejected() {
    let (transport, _rx) = RecordingTransport::new();
    let result = BatchScheduler::new(transport, 50, INTERVAL);
    assert!(matches!(result, Err(ConfigError::NoRuntime)));
}
