use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::ConfigError;
use crate::transport::Transport;
use crate::types::{ErrorBatch, ErrorEvent};

/// Accumulates accepted events for the remote collector.
///
/// A batch goes out when the queue reaches `batch_size` or when the
/// single flush timer fires, whichever comes first. The queue is swapped
/// out before the send starts, so events enqueued while a batch is in
/// flight land in the next batch. Delivery is at-most-once: a failed batch
/// is logged and discarded.
pub struct BatchScheduler {
    inner: Arc<BatchInner>,
}

struct BatchInner {
    state: Mutex<BatchState>,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    batch_size: usize,
    interval: Duration,
}

#[derive(Default)]
struct BatchState {
    queue: Vec<ErrorEvent>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the armed timer is replaced or cancelled.
    generation: u64,
    closed: bool,
}

impl BatchScheduler {
    /// Bind to the current Tokio runtime. Fails with
    /// [`ConfigError::NoRuntime`] when called outside one.
    pub fn new(
        transport: Arc<dyn Transport>,
        batch_size: usize,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::with_runtime(transport, batch_size, interval, runtime))
    }

    pub fn with_runtime(
        transport: Arc<dyn Transport>,
        batch_size: usize,
        interval: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                state: Mutex::new(BatchState::default()),
                transport,
                runtime,
                batch_size: batch_size.max(1),
                interval,
            }),
        }
    }

    /// Append an event. Returns `false` once the scheduler is shut down.
    pub fn enqueue(&self, event: ErrorEvent) -> bool {
        let mut state = self.inner.state.lock();
        if state.closed {
            return false;
        }

        state.queue.push(event);

        if state.queue.len() >= self.inner.batch_size {
            let batch = take_batch(&mut state);
            drop(state);
            self.inner.dispatch(batch);
        } else if state.timer.is_none() {
            state.generation += 1;
            let generation = state.generation;
            let weak = Arc::downgrade(&self.inner);
            let interval = self.inner.interval;
            state.timer = Some(self.inner.runtime.spawn(fire_after(weak, interval, generation)));
        }
        true
    }

    /// Send everything queued now. Returns how many events were handed to
    /// the transport; a no-op on an empty queue.
    pub fn flush(&self) -> usize {
        let batch = {
            let mut state = self.inner.state.lock();
            if state.queue.is_empty() {
                return 0;
            }
            take_batch(&mut state)
        };
        let sent = batch.len();
        self.inner.dispatch(batch);
        sent
    }

    /// Number of events waiting for the next batch.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_timer_armed(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Cancel the timer and drop queued events without sending them.
    /// Returns the number of events dropped. In-flight sends are not aborted.
    pub fn shutdown(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.closed = true;
        cancel_timer(&mut state);
        let dropped = state.queue.len();
        state.queue.clear();
        dropped
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        cancel_timer(&mut self.inner.state.lock());
    }
}

impl BatchInner {
    fn dispatch(&self, batch: ErrorBatch) {
        let transport = self.transport.clone();
        self.runtime.spawn(async move {
            let size = batch.len();
            match transport.send(&batch).await {
                Ok(()) => {
                    crate::metric_inc("sentinel.batch.sent");
                    tracing::debug!(size, "error batch delivered");
                }
                Err(err) => {
                    crate::metric_inc("sentinel.batch.failed");
                    tracing::warn!(size, error = %err, "failed to deliver error batch, batch discarded");
                }
            }
        });
    }

    fn fire(&self, generation: u64) {
        let batch = {
            let mut state = self.state.lock();
            if state.generation != generation || state.timer.is_none() {
                return;
            }
            // This task is the timer; clear it without aborting ourselves.
            state.timer = None;
            if state.queue.is_empty() {
                return;
            }
            ErrorBatch::new(std::mem::take(&mut state.queue))
        };
        self.dispatch(batch);
    }
}

async fn fire_after(inner: Weak<BatchInner>, interval: Duration, generation: u64) {
    tokio::time::sleep(interval).await;
    if let Some(inner) = inner.upgrade() {
        inner.fire(generation);
    }
}

fn take_batch(state: &mut BatchState) -> ErrorBatch {
    cancel_timer(state);
    ErrorBatch::new(std::mem::take(&mut state.queue))
}

fn cancel_timer(state: &mut BatchState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    state.generation += 1;
}
