#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use error_sentinel::{DeliveryError, ErrorBatch, ErrorEvent, Transport};
use tokio::sync::mpsc;

/// Hand-driven clock for deduplication and timestamps.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn at(ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(ms)))
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }

    pub fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> impl Fn() -> u64 + Send + Sync + 'static {
        let inner = self.0.clone();
        move || inner.load(Ordering::SeqCst)
    }
}

/// Transport that hands every batch to the test through a channel.
pub struct RecordingTransport {
    tx: mpsc::UnboundedSender<ErrorBatch>,
    fail_with: Option<DeliveryError>,
}

impl RecordingTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ErrorBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, fail_with: None }), rx)
    }

    pub fn failing(err: DeliveryError) -> (Arc<Self>, mpsc::UnboundedReceiver<ErrorBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, fail_with: Some(err) }), rx)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, batch: &ErrorBatch) -> Result<(), DeliveryError> {
        let _ = self.tx.send(batch.clone());
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

pub fn event(endpoint: &str, timestamp: u64) -> ErrorEvent {
    ErrorEvent {
        endpoint: endpoint.to_string(),
        method: "GET".to_string(),
        status_code: 500,
        timestamp,
        team: "platform".to_string(),
        username: None,
        response_payload: None,
        headers: None,
    }
}
