use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::error::StoreError;
use crate::storage::ErrorStore;
use crate::types::ErrorEvent;

/// Future resolving to an opened store.
pub type StoreOpener =
    Pin<Box<dyn Future<Output = Result<Arc<dyn ErrorStore>, StoreError>> + Send + 'static>>;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// A unit of work consumed by the store worker.
pub(crate) enum StoreCommand {
    Put(ErrorEvent),
    GetAll(Reply<Vec<ErrorEvent>>),
    Range {
        start: u64,
        end: u64,
        reply: Reply<Vec<ErrorEvent>>,
    },
    Count(Reply<usize>),
    Clear(Reply<()>),
    /// Stop after the commands already queued.
    Close,
}

/// Main store worker loop.
///
/// The worker:
/// - Awaits the opener before touching any command
/// - Warns when the opened store enforces a different capacity
/// - Applies commands strictly in arrival order, one at a time
/// - Logs failed writes instead of propagating them
/// - Closes the store on `Close` or once every sender is gone
pub(crate) async fn store_loop(
    opener: StoreOpener,
    capacity: usize,
    mut rx: mpsc::UnboundedReceiver<StoreCommand>,
) {
    let store = match opener.await {
        Ok(store) => {
            if let Some(actual) = store.max_records().filter(|&n| n != capacity) {
                tracing::warn!(
                    configured = capacity,
                    store = actual,
                    "error store capacity differs from configuration, store capacity applies"
                );
            }
            Some(store)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to open error store, local errors will not be kept");
            None
        }
    };

    while let Some(command) = rx.recv().await {
        if matches!(command, StoreCommand::Close) {
            break;
        }
        let Some(store) = store.as_ref() else {
            reject(command);
            continue;
        };
        apply(store.as_ref(), command).await;
    }

    if let Some(store) = store {
        store.close().await;
    }
    tracing::debug!("error store worker stopped");
}

async fn apply(store: &dyn ErrorStore, command: StoreCommand) {
    match command {
        StoreCommand::Put(event) => {
            if let Err(err) = store.put(&event).await {
                tracing::warn!(
                    endpoint = %event.endpoint,
                    team = %event.team,
                    error = %err,
                    "failed to persist error event"
                );
            }
        }
        StoreCommand::GetAll(reply) => {
            let _ = reply.send(store.get_all().await);
        }
        StoreCommand::Range { start, end, reply } => {
            let _ = reply.send(store.get_by_time_range(start, end).await);
        }
        StoreCommand::Count(reply) => {
            let _ = reply.send(store.count().await);
        }
        StoreCommand::Clear(reply) => {
            let _ = reply.send(store.clear().await);
        }
        StoreCommand::Close => {}
    }
}

fn reject(command: StoreCommand) {
    match command {
        StoreCommand::Put(event) => {
            tracing::warn!(
                endpoint = %event.endpoint,
                team = %event.team,
                "error store not initialized, event dropped"
            );
        }
        StoreCommand::GetAll(reply) | StoreCommand::Range { reply, .. } => {
            let _ = reply.send(Err(StoreError::NotInitialized));
        }
        StoreCommand::Count(reply) => {
            let _ = reply.send(Err(StoreError::NotInitialized));
        }
        StoreCommand::Clear(reply) => {
            let _ = reply.send(Err(StoreError::NotInitialized));
        }
        StoreCommand::Close => {}
    }
}

/// Sending half of the store worker, shared by the engine and its hooks.
#[derive(Clone)]
pub(crate) struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreCommand>,
}

impl StoreHandle {
    pub(crate) fn spawn(opener: StoreOpener, capacity: usize, runtime: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(store_loop(opener, capacity, rx));
        Self { tx }
    }

    pub(crate) fn put(&self, event: ErrorEvent) -> bool {
        self.tx.send(StoreCommand::Put(event)).is_ok()
    }

    pub(crate) async fn get_all(&self) -> Result<Vec<ErrorEvent>, StoreError> {
        self.request(StoreCommand::GetAll).await
    }

    pub(crate) async fn range(&self, start: u64, end: u64) -> Result<Vec<ErrorEvent>, StoreError> {
        self.request(|reply| StoreCommand::Range { start, end, reply }).await
    }

    pub(crate) async fn count(&self) -> Result<usize, StoreError> {
        self.request(StoreCommand::Count).await
    }

    pub(crate) async fn clear(&self) -> Result<(), StoreError> {
        self.request(StoreCommand::Clear).await
    }

    pub(crate) fn close(&self) {
        let _ = self.tx.send(StoreCommand::Close);
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }
}
