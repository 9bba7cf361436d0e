//! Boundary with the code that actually performs HTTP calls.
//!
//! An [`Interceptor`] wraps an existing [`HttpCall`] implementation and the
//! engine. It forwards every call unchanged and, when the call failed,
//! turns it into an [`Observation`] for [`Sentinel::report`]. Installing it
//! is an explicit wrap of the caller's client; nothing global is patched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::ReportOutcome;
use crate::sentinel::Sentinel;
use crate::types::Observation;

/// An outbound request as seen by the interceptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl CallRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response that arrived, whatever its status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// The call never produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub message: String,
    pub timeout: bool,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), timeout: false }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { message: message.into(), timeout: true }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timeout {
            write!(f, "request timed out: {}", self.message)
        } else {
            write!(f, "request failed: {}", self.message)
        }
    }
}

impl std::error::Error for CallError {}

/// Performs one HTTP call.
#[async_trait]
pub trait HttpCall: Send + Sync {
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError>;
}

/// Wraps an [`HttpCall`] and reports its failures to the engine.
pub struct Interceptor<C> {
    inner: C,
    sentinel: Arc<Sentinel>,
    base: Option<Url>,
}

impl<C: HttpCall> Interceptor<C> {
    /// Wrap `inner`. Relative request URLs resolve against the engine's
    /// configured origin, if any.
    pub fn install(inner: C, sentinel: Arc<Sentinel>) -> Self {
        let base = sentinel.config().origin().cloned();
        Self { inner, sentinel, base }
    }

    /// Override the base URL used to turn request URLs into endpoints.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    /// Remove the interceptor and get the original call back.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Report `result` if it is a failure. Returns `None` for successful
    /// calls, which are never reported.
    pub fn observe(
        &self,
        method: &str,
        url: &str,
        result: &Result<CallResponse, CallError>,
    ) -> Option<ReportOutcome> {
        let endpoint = extract_endpoint(url, self.base.as_ref());
        let method = if method.is_empty() { "GET".to_string() } else { method.to_ascii_uppercase() };

        let observation = match result {
            Ok(response) if response.status >= 400 => {
                let mut observation = Observation::new(endpoint, method, response.status);
                if !response.body.is_empty() {
                    observation = observation.with_payload(response.body.clone());
                }
                for name in self.sentinel.capture_headers() {
                    if let Some(value) = find_header(&response.headers, name) {
                        observation = observation.with_header(name.clone(), value);
                    }
                }
                observation
            }
            Ok(_) => return None,
            Err(err) => Observation::new(endpoint, method, 0).with_payload(err.message.clone()),
        };

        Some(self.sentinel.report(observation))
    }
}

#[async_trait]
impl<C: HttpCall> HttpCall for Interceptor<C> {
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError> {
        let method = request.method.clone();
        let url = request.url.clone();
        let result = self.inner.call(request).await;
        self.observe(&method, &url, &result);
        result
    }
}

fn find_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.is_empty())
        .map(|(_, v)| v.as_str())
}

/// Reduce a request URL to its path.
///
/// Absolute URLs lose scheme, host and query; relative ones are resolved
/// against `base` first. Anything that cannot be resolved is returned as is.
pub fn extract_endpoint(url: &str, base: Option<&Url>) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.has_host() {
            return parsed.path().to_string();
        }
    }
    if let Some(base) = base {
        if let Ok(joined) = base.join(url) {
            return joined.path().to_string();
        }
    }
    url.to_string()
}

/// [`HttpCall`] over a `reqwest::Client`.
#[cfg(feature = "http")]
#[derive(Clone, Default)]
pub struct ReqwestCall {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestCall {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl HttpCall for ReqwestCall {
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| CallError::new(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                CallError::timeout(err.to_string())
            } else {
                CallError::new(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        // An unreadable body is reported as empty rather than failing the call.
        let body = response.text().await.unwrap_or_default();

        Ok(CallResponse { status, headers, body })
    }
}
