use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::types::ErrorEvent;

/// Capacity-bounded, insertion-ordered collection of accepted errors.
///
/// Implementations enforce their own capacity: a `put` on a full store
/// evicts the single oldest record before inserting. The engine drives
/// every store through one worker task, so calls on an instance never
/// interleave when used through [`crate::Sentinel`].
#[async_trait]
pub trait ErrorStore: Send + Sync {
    async fn put(&self, event: &ErrorEvent) -> Result<(), StoreError>;

    /// All records in insertion order.
    async fn get_all(&self) -> Result<Vec<ErrorEvent>, StoreError>;

    /// Records with `start <= timestamp <= end`, oldest first.
    async fn get_by_time_range(&self, start: u64, end: u64) -> Result<Vec<ErrorEvent>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Capacity the store enforces, if it has a fixed one.
    fn max_records(&self) -> Option<usize> {
        None
    }

    /// Release the underlying handle. Later calls fail with [`StoreError::Closed`].
    async fn close(&self) {}
}

/// Volatile in-process store.
#[derive(Debug)]
pub struct InMemoryStore {
    capacity: usize,
    errors: Mutex<Vec<ErrorEvent>>,
}

impl InMemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl ErrorStore for InMemoryStore {
    async fn put(&self, event: &ErrorEvent) -> Result<(), StoreError> {
        let mut errors = self.errors.lock().await;
        errors.push(event.clone());
        if errors.len() > self.capacity {
            let overflow = errors.len() - self.capacity;
            errors.drain(..overflow);
            crate::metric_inc("sentinel.store.evicted");
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ErrorEvent>, StoreError> {
        Ok(self.errors.lock().await.clone())
    }

    async fn get_by_time_range(&self, start: u64, end: u64) -> Result<Vec<ErrorEvent>, StoreError> {
        let errors = self.errors.lock().await;
        let mut selected: Vec<ErrorEvent> = errors
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect();
        selected.sort_by_key(|e| e.timestamp);
        Ok(selected)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.errors.lock().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.errors.lock().await.len())
    }

    fn max_records(&self) -> Option<usize> {
        Some(self.capacity)
    }
}
