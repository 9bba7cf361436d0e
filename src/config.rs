use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::routing::RoutingRule;
use crate::types::{now_millis, DeliveryMode};

/// Resolves the current user at acceptance time.
pub type UsernameResolver = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub const DEFAULT_TEAM: &str = "unknown";
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_LOCAL_ERRORS: usize = 1_000;
pub const DEFAULT_DB_NAME: &str = "sentinel";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable engine configuration.
///
/// Built once through [`SentinelConfig::builder`]; every optional setting
/// already carries its resolved default.
#[derive(Clone)]
pub struct SentinelConfig {
    mode: DeliveryMode,
    rules: Vec<RoutingRule>,
    default_team: String,
    enabled: bool,
    batch_size: usize,
    batch_interval: Duration,
    dedup_window: Duration,
    max_local_errors: usize,
    db_name: String,
    backend_url: Option<String>,
    api_key: Option<String>,
    capture_headers: Vec<String>,
    username_resolver: Option<UsernameResolver>,
    origin: Option<Url>,
    channel_url: Option<Url>,
    clock: Clock,
    request_timeout: Duration,
}

impl SentinelConfig {
    pub fn builder() -> SentinelConfigBuilder {
        SentinelConfigBuilder::default()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn default_team(&self) -> &str {
        &self.default_team
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    pub fn max_local_errors(&self) -> usize {
        self.max_local_errors
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn backend_url(&self) -> Option<&str> {
        self.backend_url.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn capture_headers(&self) -> &[String] {
        &self.capture_headers
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn channel_url(&self) -> Option<&Url> {
        self.channel_url.as_ref()
    }

    pub(crate) fn username(&self) -> Option<String> {
        self.username_resolver.as_ref().and_then(|resolve| resolve())
    }

    pub(crate) fn now(&self) -> u64 {
        (self.clock)()
    }
}

impl fmt::Debug for SentinelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelConfig")
            .field("mode", &self.mode)
            .field("rules", &self.rules)
            .field("default_team", &self.default_team)
            .field("enabled", &self.enabled)
            .field("batch_size", &self.batch_size)
            .field("batch_interval", &self.batch_interval)
            .field("dedup_window", &self.dedup_window)
            .field("max_local_errors", &self.max_local_errors)
            .field("db_name", &self.db_name)
            .field("backend_url", &self.backend_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("capture_headers", &self.capture_headers)
            .field("origin", &self.origin.as_ref().map(Url::as_str))
            .field("channel_url", &self.channel_url.as_ref().map(Url::as_str))
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SentinelConfig`].
#[derive(Default)]
pub struct SentinelConfigBuilder {
    mode: Option<DeliveryMode>,
    rules: Vec<RoutingRule>,
    default_team: Option<String>,
    enabled: Option<bool>,
    batch_size: Option<usize>,
    batch_interval: Option<Duration>,
    dedup_window: Option<Duration>,
    max_local_errors: Option<usize>,
    db_name: Option<String>,
    backend_url: Option<String>,
    api_key: Option<String>,
    capture_headers: Vec<String>,
    username_resolver: Option<UsernameResolver>,
    origin: Option<String>,
    channel_url: Option<String>,
    clock: Option<Clock>,
    request_timeout: Option<Duration>,
}

impl SentinelConfigBuilder {
    /// Local storage or remote collector. Defaults to local.
    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Append a routing rule; its kind is inferred from the pattern syntax.
    pub fn with_rule(mut self, pattern: impl Into<String>, team: impl Into<String>) -> Self {
        self.rules.push(RoutingRule::new(pattern, team));
        self
    }

    /// Append already-built rules, keeping their order.
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = RoutingRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Append `(pattern, team)` pairs in iteration order.
    pub fn with_team_mapping<I, P, T>(mut self, mapping: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
        T: Into<String>,
    {
        self.rules
            .extend(mapping.into_iter().map(|(p, t)| RoutingRule::new(p, t)));
        self
    }

    /// Team assigned to unmatched endpoints. Events for it are dropped.
    pub fn with_default_team(mut self, team: impl Into<String>) -> Self {
        self.default_team = Some(team.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = Some(interval);
        self
    }

    /// Zero disables deduplication.
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = Some(window);
        self
    }

    pub fn with_max_local_errors(mut self, capacity: usize) -> Self {
        self.max_local_errors = Some(capacity);
        self
    }

    /// Name of the durable local store.
    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = Some(name.into());
        self
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Response headers to capture, e.g. `x-correlation-id`.
    pub fn with_capture_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capture_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_username_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        let resolver: UsernameResolver = Arc::new(resolver);
        self.username_resolver = Some(resolver);
        self
    }

    /// Page origin used to resolve bare paths against URL routing patterns.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Chat channel that team reports are posted to as a prefilled message.
    pub fn with_channel_url(mut self, url: impl Into<String>) -> Self {
        self.channel_url = Some(url.into());
        self
    }

    /// Replace the system clock, mainly for tests.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        let clock: Clock = Arc::new(clock);
        self.clock = Some(clock);
        self
    }

    /// Per-request timeout of the HTTP transport.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<SentinelConfig, ConfigError> {
        let mode = self.mode.unwrap_or_default();

        let backend_url = self.backend_url.filter(|u| !u.trim().is_empty());
        let api_key = self.api_key.filter(|k| !k.trim().is_empty());

        if mode == DeliveryMode::Remote {
            if backend_url.is_none() {
                return Err(ConfigError::MissingBackendUrl);
            }
            if api_key.is_none() {
                return Err(ConfigError::MissingApiKey);
            }
        }

        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        let max_local_errors = self.max_local_errors.unwrap_or(DEFAULT_MAX_LOCAL_ERRORS);
        if max_local_errors == 0 {
            return Err(ConfigError::InvalidCapacity);
        }

        let origin = match self.origin {
            Some(origin) => match Url::parse(&origin) {
                Ok(url) if url.has_host() => Some(url),
                _ => return Err(ConfigError::InvalidOrigin { origin }),
            },
            None => None,
        };

        let channel_url = match self.channel_url {
            Some(url) => match Url::parse(&url) {
                Ok(parsed) if parsed.has_host() => Some(parsed),
                _ => return Err(ConfigError::InvalidChannelUrl { url }),
            },
            None => None,
        };

        Ok(SentinelConfig {
            mode,
            rules: self.rules,
            default_team: self.default_team.unwrap_or_else(|| DEFAULT_TEAM.to_string()),
            enabled: self.enabled.unwrap_or(true),
            batch_size,
            batch_interval: self.batch_interval.unwrap_or(DEFAULT_BATCH_INTERVAL),
            dedup_window: self.dedup_window.unwrap_or(DEFAULT_DEDUP_WINDOW),
            max_local_errors,
            db_name: self.db_name.unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            backend_url,
            api_key,
            capture_headers: self.capture_headers,
            username_resolver: self.username_resolver,
            origin,
            channel_url,
            clock: self.clock.unwrap_or_else(|| Arc::new(now_millis) as Clock),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}
