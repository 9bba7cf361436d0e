use std::time::Duration;

use error_sentinel::{Observation, Sentinel, SentinelConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SentinelConfig::builder()
        .with_team_mapping([
            ("/api/users", "identity"),
            ("/api/orders", "commerce"),
            ("/^/api/v\\d+/billing/", "billing"),
        ])
        .with_capture_headers(["x-correlation-id"])
        .with_dedup_window(Duration::from_secs(30))
        .with_username_resolver(|| Some("demo-user".to_string()))
        .build()
        .expect("valid configuration");

    let sentinel = Sentinel::new(config).expect("engine starts");

    let observations = [
        Observation::new("/api/users/17", "GET", 500)
            .with_payload(r#"{"error":"database unavailable"}"#)
            .with_header("X-Correlation-Id", "c0ffee"),
        Observation::new("/api/users/17", "GET", 500),
        Observation::new("/api/orders", "POST", 422),
        Observation::new("/api/v2/billing/invoices", "GET", 0).with_payload("connection reset"),
        Observation::new("/static/logo.png", "GET", 404),
    ];

    for observation in observations {
        let endpoint = observation.endpoint.clone();
        println!("{:<28} -> {:?}", endpoint, sentinel.report(observation));
    }

    println!();
    println!("{}", sentinel.team_report().await.expect("local store readable"));

    sentinel.destroy();
}
