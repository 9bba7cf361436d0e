use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use error_sentinel::{
    extract_endpoint,
    CallError,
    CallRequest,
    CallResponse,
    HttpCall,
    Interceptor,
    ReportOutcome,
    Sentinel,
    SentinelConfig,
};
use url::Url;

/// Answers every call with the same canned result.
struct CannedCall(Result<CallResponse, CallError>);

#[async_trait]
impl HttpCall for CannedCall {
    async fn call(&self, _request: CallRequest) -> Result<CallResponse, CallError> {
        self.0.clone()
    }
}

fn response(status: u16, body: &str) -> CallResponse {
    let mut headers = BTreeMap::new();
    headers.insert("X-Request-Id".to_string(), "req-7".to_string());
    headers.insert("Server".to_string(), "edge".to_string());
    CallResponse { status, headers, body: body.to_string() }
}

fn sentinel() -> Arc<Sentinel> {
    let config = SentinelConfig::builder()
        .with_rule("/api/users", "platform")
        .with_capture_headers(["x-request-id"])
        .with_origin("https://app.example.com")
        .build()
        .unwrap();
    Arc::new(Sentinel::new(config).unwrap())
}

#[test]
fn test_extract_endpoint() {
    let base = Url::parse("https://app.example.com/dashboard/").unwrap();

    assert_eq!(
        extract_endpoint("https://api.example.com/api/users/1?page=2", None),
        "/api/users/1"
    );
    assert_eq!(extract_endpoint("/api/users?page=2", Some(&base)), "/api/users");
    assert_eq!(extract_endpoint("settings", Some(&base)), "/dashboard/settings");
    assert_eq!(extract_endpoint("/api/users", None), "/api/users");
}

#[tokio::test]
async fn test_failed_response_is_reported_and_passed_through() {
    let sentinel = sentinel();
    let client = Interceptor::install(CannedCall(Ok(response(503, "down"))), sentinel.clone());

    let result = client
        .call(CallRequest::new("post", "https://api.example.com/api/users/1?x=1"))
        .await;
    assert_eq!(result.unwrap().status, 503);

    let errors = sentinel.get_local_errors().await.unwrap();
    assert_eq!(errors.len(), 1);
    let error = &errors[0];
    assert_eq!(error.endpoint, "/api/users/1");
    assert_eq!(error.method, "POST");
    assert_eq!(error.status_code, 503);
    assert_eq!(error.response_payload.as_deref(), Some("down"));

    let headers = error.headers.as_ref().unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers["x-request-id"], "req-7");
}

#[tokio::test]
async fn test_successful_response_is_not_reported() {
    let sentinel = sentinel();
    let client = Interceptor::install(CannedCall(Ok(response(200, "ok"))), sentinel.clone());

    let result = client.call(CallRequest::new("GET", "/api/users")).await;
    assert!(result.is_ok());

    assert_eq!(client.observe("GET", "/api/users", &result), None);
    assert_eq!(sentinel.count_local_errors().await.unwrap(), 0);
}

#[tokio::test]
async fn test_transport_failure_is_reported_as_status_zero() {
    let sentinel = sentinel();
    let client = Interceptor::install(
        CannedCall(Err(CallError::timeout("deadline elapsed"))),
        sentinel.clone(),
    );

    let result = client.call(CallRequest::new("", "/api/users/9")).await;
    assert!(result.unwrap_err().timeout);

    let errors = sentinel.get_local_errors().await.unwrap();
    assert_eq!(errors[0].status_code, 0);
    assert_eq!(errors[0].method, "GET");
    assert_eq!(errors[0].response_payload.as_deref(), Some("deadline elapsed"));
    assert!(errors[0].is_network_failure());
}

#[tokio::test]
async fn test_observe_returns_the_engine_outcome() {
    let sentinel = sentinel();
    let client = Interceptor::install(CannedCall(Ok(response(500, ""))), sentinel.clone());
    let failed = Ok(response(500, ""));

    assert_eq!(
        client.observe("GET", "/api/users", &failed),
        Some(ReportOutcome::Persisted)
    );
    assert!(matches!(
        client.observe("GET", "/api/other", &failed),
        Some(ReportOutcome::Dropped(_))
    ));

    let inner = client.into_inner();
    assert_eq!(inner.0.as_ref().unwrap().status, 500);
}
