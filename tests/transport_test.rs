#![cfg(feature = "http")]

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::event;
use error_sentinel::{DeliveryError, ErrorBatch, HttpTransport, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// What the collector received.
struct Captured {
    request_line: String,
    headers: HashMap<String, String>,
    body: String,
}

/// Accept one request, answer it with `status` and hand it back.
async fn collector(status: u16) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap().to_string();
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();

        let length: usize = headers
            .get("content-length")
            .map(|v| v.parse().unwrap())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[head_end..]).to_string();

        let response = format!("HTTP/1.1 {} Stub\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status);
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        let _ = tx.send(Captured { request_line, headers, body });
    });

    (base, rx)
}

#[tokio::test]
async fn test_batch_is_posted_to_errors_endpoint() {
    let (base, captured) = collector(202).await;
    let transport = HttpTransport::new(&format!("{}/", base), Some("k".to_string()), Duration::from_secs(5));

    let batch = ErrorBatch::new(vec![event("/a", 1_000)]);
    transport.send(&batch).await.unwrap();

    let captured = captured.await.unwrap();
    assert_eq!(captured.request_line, "POST /errors HTTP/1.1");
    assert_eq!(captured.headers["content-type"], "application/json");
    assert_eq!(captured.headers["authorization"], "Bearer k");

    let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["endpoint"], "/a");
    assert_eq!(errors[0]["statusCode"], 500);
    assert_eq!(errors[0]["timestamp"], 1_000);
    assert_eq!(errors[0]["team"], "platform");
    assert!(errors[0].get("username").is_none());
}

#[tokio::test]
async fn test_non_success_status_is_a_delivery_failure() {
    let (base, captured) = collector(500).await;
    let transport = HttpTransport::new(&base, Some("k".to_string()), Duration::from_secs(5));

    let result = transport.send(&ErrorBatch::new(vec![event("/a", 1)])).await;
    assert_eq!(result, Err(DeliveryError::Status(500)));
    assert!(captured.await.is_ok());
}

#[tokio::test]
async fn test_unreachable_collector_is_a_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let transport = HttpTransport::new(&base, None, Duration::from_secs(5));
    let result = transport.send(&ErrorBatch::new(vec![event("/a", 1)])).await;
    assert!(matches!(result, Err(DeliveryError::Network(_)) | Err(DeliveryError::Timeout)));
}
