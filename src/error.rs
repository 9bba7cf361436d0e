use std::fmt;

use crate::types::DeliveryMode;

/// Errors returned when building a configuration or an engine.
///
/// These are the only fatal errors in the crate: once a [`crate::Sentinel`]
/// exists, every failure degrades to "this error was not tracked".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Remote mode selected without a backend URL.
    MissingBackendUrl,

    /// Remote mode selected without an API key.
    MissingApiKey,

    /// Batch size must be at least 1.
    InvalidBatchSize,

    /// Local storage capacity must be at least 1.
    InvalidCapacity,

    /// Origin could not be parsed as an absolute URL.
    InvalidOrigin {
        origin: String,
    },

    /// Remote mode without a transport (the `http` feature is disabled
    /// and none was supplied).
    MissingTransport,

    /// The engine was built outside a Tokio runtime.
    NoRuntime,

    /// A store was supplied to a remote-mode engine, or a transport to a
    /// local-mode one.
    ModeMismatch {
        mode: DeliveryMode,
        collaborator: &'static str,
    },

    /// A supplied store enforces a different capacity than configured.
    CapacityMismatch {
        configured: usize,
        store: usize,
    },

    /// Channel URL could not be parsed as an absolute URL.
    InvalidChannelUrl {
        url: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingBackendUrl =>
                write!(f, "remote mode requires a backend URL"),
            ConfigError::MissingApiKey =>
                write!(f, "remote mode requires an API key"),
            ConfigError::InvalidBatchSize =>
                write!(f, "batch size must be at least 1"),
            ConfigError::InvalidCapacity =>
                write!(f, "local storage capacity must be at least 1"),
            ConfigError::InvalidOrigin { origin } =>
                write!(f, "origin is not an absolute URL: {}", origin),
            ConfigError::MissingTransport =>
                write!(f, "remote mode requires a transport"),
            ConfigError::NoRuntime =>
                write!(f, "engine must be built inside a Tokio runtime"),
            ConfigError::ModeMismatch { mode, collaborator } =>
                write!(f, "a {} cannot be used in {} mode", collaborator, mode),
            ConfigError::CapacityMismatch { configured, store } =>
                write!(f, "store capacity {} does not match configured capacity {}", store, configured),
            ConfigError::InvalidChannelUrl { url } =>
                write!(f, "channel URL is not an absolute URL: {}", url),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failures of a local error store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store has not finished opening, or opening failed.
    NotInitialized,

    /// The store handle was closed by teardown.
    Closed,

    /// The backend rejected or aborted the operation.
    Backend(String),

    /// A record could not be encoded or decoded.
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotInitialized =>
                write!(f, "error store not initialized"),
            StoreError::Closed =>
                write!(f, "error store is closed"),
            StoreError::Backend(msg) =>
                write!(f, "error store backend failure: {}", msg),
            StoreError::Serialization(msg) =>
                write!(f, "error record serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Reasons why posting a batch to the collector failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    Timeout,
    Network(String),
    /// Collector answered with a non-2xx status.
    Status(u16),
    Serialization(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Timeout =>
                write!(f, "request timed out"),
            DeliveryError::Network(msg) =>
                write!(f, "network error: {}", msg),
            DeliveryError::Status(status) =>
                write!(f, "collector returned HTTP {}", status),
            DeliveryError::Serialization(msg) =>
                write!(f, "batch serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// What `report()` did with an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Handed to the local store.
    Persisted,
    /// Appended to the remote batch queue.
    Queued,
    Dropped(DropReason),
}

impl ReportOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, ReportOutcome::Dropped(_))
    }
}

/// Reasons why an observation was not tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Reporting is switched off.
    Disabled,

    /// No routing rule matched; the endpoint belongs to the default team.
    Unmatched,

    /// Same endpoint, method, status and team seen within the window.
    Duplicate,

    /// The engine has been torn down.
    Destroyed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Disabled => write!(f, "reporting disabled"),
            DropReason::Unmatched => write!(f, "no routing rule matched"),
            DropReason::Duplicate => write!(f, "duplicate within window"),
            DropReason::Destroyed => write!(f, "engine destroyed"),
        }
    }
}
