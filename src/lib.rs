//! A client-side HTTP error intake engine.
//!
//! This crate watches failed outbound calls (reported by an interceptor),
//! attributes each failure to an owning team, suppresses repeats within a
//! time window, and delivers what is left either to a **bounded local
//! store** or to a **remote collector in batches**.
//!
//! ## Guarantees
//! - Routing is deterministic: exact match first, then first matching rule
//! - Bounded resource usage: the local store never exceeds its capacity
//! - `report` never blocks and never fails the caller
//! - At most one pending flush timer per engine
//!
//! ## Non-Guarantees
//! - Remote delivery is at-most-once: failed batches are not retried
//! - Unmatched endpoints are not kept under a fallback team
//! - Nothing is delivered during teardown
//!
//! This crate is intentionally **not an observability pipeline**.
//! It reports discrete failures, not metrics or traces.

mod batch;
mod config;
mod dedup;
mod error;
mod intercept;
mod report;
mod routing;
mod sentinel;
mod storage;
mod transport;
mod types;
mod worker;

#[cfg(feature = "redis")]
mod storage_redis;

#[cfg(feature = "postgres")]
mod storage_postgres;

pub use batch::BatchScheduler;
pub use config::{
    Clock,
    SentinelConfig,
    SentinelConfigBuilder,
    UsernameResolver,
    DEFAULT_BATCH_INTERVAL,
    DEFAULT_BATCH_SIZE,
    DEFAULT_DB_NAME,
    DEFAULT_DEDUP_WINDOW,
    DEFAULT_MAX_LOCAL_ERRORS,
    DEFAULT_TEAM,
};
pub use dedup::DedupCache;
pub use error::{
    ConfigError,
    DeliveryError,
    DropReason,
    ReportOutcome,
    StoreError,
};
pub use intercept::{extract_endpoint, CallError, CallRequest, CallResponse, HttpCall, Interceptor};
pub use report::{
    channel_deep_link,
    correlation_id,
    format_timestamp,
    group_by_team,
    render_error_report,
    render_team_report,
    status_message,
};
pub use routing::{resolve_team, PatternKind, RoutingRule, TeamRouter, TLD_MARKER};
pub use sentinel::{InspectionHooks, InspectionSurface, Sentinel};
pub use storage::{ErrorStore, InMemoryStore};
pub use transport::{errors_url, Transport};
pub use types::{
    truncate_payload,
    DedupKey,
    DeliveryMode,
    ErrorBatch,
    ErrorEvent,
    Observation,
    MAX_PAYLOAD_CHARS,
    TRUNCATION_MARKER,
};
pub use worker::StoreOpener;

#[cfg(feature = "http")]
pub use intercept::ReqwestCall;

#[cfg(feature = "http")]
pub use transport::HttpTransport;

#[cfg(feature = "redis")]
pub use storage_redis::RedisStore;

#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresStore;

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc(_name: &'static str) {}
