use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::types::ErrorBatch;

/// Delivers one batch to the remote collector.
///
/// A returned error is final: batches are never retried.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &ErrorBatch) -> Result<(), DeliveryError>;
}

/// `POST {backend_url}/errors` with a bearer token.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: std::time::Duration,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new(backend_url: &str, api_key: Option<String>, timeout: std::time::Duration) -> Self {
        Self::with_client(reqwest::Client::new(), backend_url, api_key, timeout)
    }

    pub fn with_client(
        client: reqwest::Client,
        backend_url: &str,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            client,
            url: errors_url(backend_url),
            api_key,
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &ErrorBatch) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(batch)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .body(body);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(DeliveryError::Status(resp.status().as_u16())),
            Err(err) if err.is_timeout() => Err(DeliveryError::Timeout),
            Err(err) => Err(DeliveryError::Network(err.to_string())),
        }
    }
}

/// Collector endpoint for a backend base URL.
pub fn errors_url(backend_url: &str) -> String {
    format!("{}/errors", backend_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_url_trims_trailing_slash() {
        assert_eq!(errors_url("https://collector.example.com"), "https://collector.example.com/errors");
        assert_eq!(errors_url("https://collector.example.com/v1/"), "https://collector.example.com/v1/errors");
    }
}
