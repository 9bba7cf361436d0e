use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of characters kept from a response payload.
pub const MAX_PAYLOAD_CHARS: usize = 1000;

/// Appended to a payload that was cut at [`MAX_PAYLOAD_CHARS`].
pub const TRUNCATION_MARKER: &str = "...";

/// One observed, accepted HTTP failure.
///
/// An `ErrorEvent` is only ever built by the engine after routing and
/// deduplication have accepted the observation, so `team` is always a
/// positively matched owner and never the configured default team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Endpoint as reported by the interceptor, usually a bare path.
    pub endpoint: String,

    /// Uppercase HTTP verb.
    pub method: String,

    /// HTTP status, `0` for a transport failure.
    pub status_code: u16,

    /// Milliseconds since the Unix epoch, assigned at acceptance time.
    pub timestamp: u64,

    /// Team the endpoint was routed to.
    pub team: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_payload: Option<String>,

    /// Captured allow-listed response headers. Never `Some` of an empty map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ErrorEvent {
    pub fn is_network_failure(&self) -> bool {
        self.status_code == 0
    }
}

/// Body posted to the remote collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBatch {
    pub errors: Vec<ErrorEvent>,
}

impl ErrorBatch {
    pub fn new(errors: Vec<ErrorEvent>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A raw failure handed over by the interception collaborator.
///
/// Nothing here has been validated or routed yet; the engine decides
/// whether it becomes an [`ErrorEvent`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub payload: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
}

impl Observation {
    /// Create an observation for a failed call.
    ///
    /// Use `status_code = 0` for a call that never produced a response.
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>, status_code: u16) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            status_code,
            payload: None,
            headers: None,
        }
    }

    /// Attach the (untruncated) response payload.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attach response headers read by the interceptor.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = Some(
            headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Attach a single response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// Deduplication identity of an observation.
///
/// The team is part of the key so the same endpoint routed to two
/// different teams is tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub team: String,
}

impl DedupKey {
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
        team: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            status_code,
            team: team.into(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}|{}", self.endpoint, self.method, self.status_code, self.team)
    }
}

/// Where accepted events go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Persist to the local error store.
    #[default]
    Local,
    /// Batch and post to a remote collector.
    Remote,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Local => write!(f, "local"),
            DeliveryMode::Remote => write!(f, "remote"),
        }
    }
}

/// Cut a payload to [`MAX_PAYLOAD_CHARS`] characters, appending the marker
/// when anything was removed.
pub fn truncate_payload(payload: &str) -> String {
    match payload.char_indices().nth(MAX_PAYLOAD_CHARS) {
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
            truncated.push_str(&payload[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => payload.to_string(),
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
