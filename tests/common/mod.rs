//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use graceful_server::config::ServerConfig;
use tokio::task::JoinHandle;

/// A config bound to an ephemeral port with short shutdown bounds.
pub fn test_config(grace_period_ms: u64, settle_interval_ms: u64) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.shutdown.grace_period_ms = grace_period_ms;
    config.shutdown.settle_interval_ms = settle_interval_ms;
    config.observability.metrics_enabled = false;
    config.observability.service_instance_id = Some("test-instance".to_string());
    config
}

/// A client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Fire `count` concurrent GETs at `path`, each on its own connection.
#[allow(dead_code)]
pub fn spawn_requests(
    addr: SocketAddr,
    path: &str,
    count: usize,
) -> Vec<JoinHandle<Result<reqwest::Response, reqwest::Error>>> {
    (0..count)
        .map(|_| {
            let url = format!("http://{}{}", addr, path);
            tokio::spawn(async move { client().get(url).send().await })
        })
        .collect()
}

/// Assert that a canceled request never delivered a success response.
#[allow(dead_code)]
pub fn assert_not_completed(result: Result<reqwest::Response, reqwest::Error>) {
    if let Ok(response) = result {
        assert_ne!(
            response.status(),
            reqwest::StatusCode::OK,
            "canceled request must not complete"
        );
    }
}
