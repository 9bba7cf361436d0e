use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::batch::BatchScheduler;
use crate::config::SentinelConfig;
use crate::dedup::DedupCache;
use crate::error::{ConfigError, DropReason, ReportOutcome, StoreError};
use crate::report::{channel_deep_link, render_team_report};
use crate::routing::TeamRouter;
use crate::storage::{ErrorStore, InMemoryStore};
use crate::transport::Transport;
use crate::types::{truncate_payload, DedupKey, DeliveryMode, ErrorEvent, Observation};
use crate::worker::{StoreHandle, StoreOpener};

/// The intake engine.
///
/// Every observation passes through the same synchronous pipeline:
///
/// 1. dropped if reporting is disabled
/// 2. routed to a team; dropped if it lands on the default team
/// 3. checked against the deduplication window; dropped if repeated
/// 4. turned into an [`ErrorEvent`] and either persisted (local mode) or
///    queued for the next batch (remote mode)
///
/// `report` never blocks and never fails: storage and delivery problems are
/// logged and the event is simply not tracked.
pub struct Sentinel {
    config: SentinelConfig,
    router: TeamRouter,
    dedup: Mutex<DedupCache>,
    delivery: Delivery,
    destroyed: AtomicBool,
}

enum Delivery {
    Local(Mutex<Option<StoreHandle>>),
    Remote(BatchScheduler),
}

impl Sentinel {
    /// Build an engine with a volatile local store and, in remote mode, the
    /// HTTP transport. Fails with [`ConfigError::NoRuntime`] outside a Tokio
    /// runtime.
    pub fn new(config: SentinelConfig) -> Result<Self, ConfigError> {
        Self::assemble(config, None, None)
    }

    /// Build a local-mode engine on an already opened store.
    ///
    /// A store that reports a fixed capacity must match
    /// `max_local_errors`.
    pub fn with_store(config: SentinelConfig, store: Arc<dyn ErrorStore>) -> Result<Self, ConfigError> {
        if let Some(capacity) = store.max_records() {
            if capacity != config.max_local_errors() {
                return Err(ConfigError::CapacityMismatch {
                    configured: config.max_local_errors(),
                    store: capacity,
                });
            }
        }
        Self::with_store_opener(config, async move { Ok(store) })
    }

    /// Build a local-mode engine whose store opens asynchronously.
    ///
    /// Events reported before the opener resolves are queued. If it fails,
    /// they are dropped with a warning and local queries return
    /// [`StoreError::NotInitialized`].
    pub fn with_store_opener<F>(config: SentinelConfig, opener: F) -> Result<Self, ConfigError>
    where
        F: Future<Output = Result<Arc<dyn ErrorStore>, StoreError>> + Send + 'static,
    {
        if config.mode() != DeliveryMode::Local {
            return Err(ConfigError::ModeMismatch { mode: config.mode(), collaborator: "store" });
        }
        Self::assemble(config, Some(Box::pin(opener)), None)
    }

    /// Build a remote-mode engine delivering through `transport`.
    pub fn with_transport(
        config: SentinelConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        if config.mode() != DeliveryMode::Remote {
            return Err(ConfigError::ModeMismatch { mode: config.mode(), collaborator: "transport" });
        }
        Self::assemble(config, None, Some(transport))
    }

    fn assemble(
        config: SentinelConfig,
        opener: Option<StoreOpener>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let delivery = match config.mode() {
            DeliveryMode::Local => {
                let capacity = config.max_local_errors();
                let opener = opener.unwrap_or_else(|| {
                    let store: Arc<dyn ErrorStore> = Arc::new(InMemoryStore::new(capacity));
                    Box::pin(async move { Ok(store) })
                });
                Delivery::Local(Mutex::new(Some(StoreHandle::spawn(opener, capacity, &runtime))))
            }
            DeliveryMode::Remote => {
                let transport = match transport {
                    Some(transport) => transport,
                    None => default_transport(&config)?,
                };
                Delivery::Remote(BatchScheduler::with_runtime(
                    transport,
                    config.batch_size(),
                    config.batch_interval(),
                    runtime,
                ))
            }
        };

        let router = TeamRouter::new(
            config.rules(),
            config.default_team(),
            config.origin().cloned(),
        );

        tracing::debug!(
            mode = %config.mode(),
            rules = router.len(),
            enabled = config.enabled(),
            "sentinel initialized"
        );

        Ok(Self {
            config,
            router,
            dedup: Mutex::new(DedupCache::new()),
            delivery,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Intake one failed call.
    pub fn report(&self, observation: Observation) -> ReportOutcome {
        if self.destroyed.load(Ordering::SeqCst) {
            tracing::debug!(endpoint = %observation.endpoint, "report after destroy ignored");
            return dropped(DropReason::Destroyed);
        }

        if !self.config.enabled() {
            return dropped(DropReason::Disabled);
        }

        let team = self.router.resolve(&observation.endpoint);
        if team == self.router.default_team() {
            return dropped(DropReason::Unmatched);
        }

        let Observation { endpoint, method, status_code, payload, headers } = observation;
        let now = self.config.now();
        let key = DedupKey::new(endpoint, method.to_ascii_uppercase(), status_code, team);
        let window = self.config.dedup_window().as_millis() as u64;

        if !self.dedup.lock().should_accept(&key, now, window) {
            return dropped(DropReason::Duplicate);
        }

        let DedupKey { endpoint, method, team, .. } = key;
        let event = ErrorEvent {
            endpoint,
            method,
            status_code,
            timestamp: now,
            team,
            username: self.config.username().filter(|u| !u.is_empty()),
            response_payload: payload
                .filter(|p| !p.is_empty())
                .map(|p| truncate_payload(&p)),
            headers: self.captured_headers(headers),
        };

        let outcome = match &self.delivery {
            Delivery::Local(handle) => {
                let sent = handle.lock().as_ref().map_or(false, |store| store.put(event));
                if sent {
                    ReportOutcome::Persisted
                } else {
                    ReportOutcome::Dropped(DropReason::Destroyed)
                }
            }
            Delivery::Remote(batch) => {
                if batch.enqueue(event) {
                    ReportOutcome::Queued
                } else {
                    ReportOutcome::Dropped(DropReason::Destroyed)
                }
            }
        };

        if outcome.is_accepted() {
            crate::metric_inc("sentinel.report.accepted");
        }
        outcome
    }

    /// Header names the interceptor should read before calling [`Sentinel::report`].
    pub fn capture_headers(&self) -> &[String] {
        self.config.capture_headers()
    }

    /// All locally stored errors in insertion order. Empty in remote mode.
    pub async fn get_local_errors(&self) -> Result<Vec<ErrorEvent>, StoreError> {
        match self.local_store()? {
            Some(store) => store.get_all().await,
            None => Ok(Vec::new()),
        }
    }

    /// Locally stored errors with `start <= timestamp <= end`, oldest first.
    pub async fn get_errors_by_time_range(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<ErrorEvent>, StoreError> {
        match self.local_store()? {
            Some(store) => store.range(start, end).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn count_local_errors(&self) -> Result<usize, StoreError> {
        match self.local_store()? {
            Some(store) => store.count().await,
            None => Ok(0),
        }
    }

    pub async fn clear_local_errors(&self) -> Result<(), StoreError> {
        match self.local_store()? {
            Some(store) => store.clear().await,
            None => Ok(()),
        }
    }

    /// Locally stored errors as a pretty-printed JSON array.
    pub async fn export_local_errors(&self) -> Result<String, StoreError> {
        let errors = self.get_local_errors().await?;
        serde_json::to_string_pretty(&errors).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Locally stored errors rendered as a team-tagged report.
    pub async fn team_report(&self) -> Result<String, StoreError> {
        let errors = self.get_local_errors().await?;
        Ok(render_team_report(&errors, self.config.now()))
    }

    /// Team report as a link into the configured chat channel. `None` when
    /// no channel is configured or nothing is stored.
    pub async fn team_report_link(&self) -> Result<Option<String>, StoreError> {
        let Some(channel) = self.config.channel_url() else {
            return Ok(None);
        };
        let errors = self.get_local_errors().await?;
        if errors.is_empty() {
            return Ok(None);
        }
        let report = render_team_report(&errors, self.config.now());
        Ok(Some(channel_deep_link(channel, &report)))
    }

    /// Send the pending batch now (remote mode). Returns the number of
    /// events handed to the transport.
    pub fn flush(&self) -> usize {
        match &self.delivery {
            Delivery::Remote(batch) => batch.flush(),
            Delivery::Local(_) => 0,
        }
    }

    /// Events waiting for the next batch (remote mode).
    pub fn pending(&self) -> usize {
        match &self.delivery {
            Delivery::Remote(batch) => batch.pending(),
            Delivery::Local(_) => 0,
        }
    }

    /// Release everything: cancel the flush timer, drop unsent events,
    /// close the local store and forget deduplication state. Nothing is
    /// delivered during teardown and sends already in flight are left alone.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        match &self.delivery {
            Delivery::Remote(batch) => {
                let dropped = batch.shutdown();
                if dropped > 0 {
                    tracing::debug!(dropped, "unsent errors discarded on destroy");
                }
            }
            Delivery::Local(handle) => {
                if let Some(store) = handle.lock().take() {
                    store.close();
                }
            }
        }

        self.dedup.lock().clear();
        tracing::debug!("sentinel destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> DeliveryMode {
        self.config.mode()
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Number of live deduplication entries.
    pub fn dedup_entries(&self) -> usize {
        self.dedup.lock().len()
    }

    /// Refresh and clear callbacks for an inspection surface.
    pub fn inspection_hooks(&self) -> InspectionHooks {
        let store = match &self.delivery {
            Delivery::Local(handle) => handle.lock().clone(),
            Delivery::Remote(_) => None,
        };
        InspectionHooks { store }
    }

    /// Hand the inspection hooks to `surface`.
    pub fn attach_surface(&self, surface: &dyn InspectionSurface) {
        surface.attach(self.inspection_hooks());
    }

    fn local_store(&self) -> Result<Option<StoreHandle>, StoreError> {
        match &self.delivery {
            Delivery::Local(handle) => handle.lock().clone().map(Some).ok_or(StoreError::Closed),
            Delivery::Remote(_) => Ok(None),
        }
    }

    fn captured_headers(
        &self,
        headers: Option<BTreeMap<String, String>>,
    ) -> Option<BTreeMap<String, String>> {
        let headers = headers?;
        let captured: BTreeMap<String, String> = self
            .config
            .capture_headers()
            .iter()
            .filter_map(|name| {
                headers
                    .iter()
                    .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.is_empty())
                    .map(|(_, v)| (name.clone(), v.clone()))
            })
            .collect();

        if captured.is_empty() {
            None
        } else {
            Some(captured)
        }
    }
}

fn dropped(reason: DropReason) -> ReportOutcome {
    crate::metric_inc("sentinel.report.dropped");
    ReportOutcome::Dropped(reason)
}

#[cfg(feature = "http")]
fn default_transport(config: &SentinelConfig) -> Result<Arc<dyn Transport>, ConfigError> {
    let url = config.backend_url().ok_or(ConfigError::MissingBackendUrl)?;
    Ok(Arc::new(crate::transport::HttpTransport::new(
        url,
        config.api_key().map(str::to_string),
        config.request_timeout(),
    )))
}

#[cfg(not(feature = "http"))]
fn default_transport(_config: &SentinelConfig) -> Result<Arc<dyn Transport>, ConfigError> {
    Err(ConfigError::MissingTransport)
}

/// Callbacks an inspection surface uses to list and clear local errors
/// without depending on the engine type.
#[derive(Clone)]
pub struct InspectionHooks {
    store: Option<StoreHandle>,
}

impl InspectionHooks {
    /// Current local errors; empty on failure or in remote mode.
    pub async fn refresh(&self) -> Vec<ErrorEvent> {
        let Some(store) = self.store.as_ref() else {
            return Vec::new();
        };
        match store.get_all().await {
            Ok(errors) => errors,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load local errors");
                Vec::new()
            }
        }
    }

    /// Remove all local errors; failures are logged.
    pub async fn clear(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(err) = store.clear().await {
            tracing::warn!(error = %err, "failed to clear local errors");
        }
    }
}

/// Something that displays local errors, e.g. an on-screen panel.
pub trait InspectionSurface {
    fn attach(&self, hooks: InspectionHooks);
}
