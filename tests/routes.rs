//! Route behaviour through the full server stack, metrics enabled.

use graceful_server::http::X_REQUEST_ID;
use graceful_server::lifecycle::Coordinator;

mod common;

#[tokio::test]
async fn hello_metrics_and_request_ids() {
    let mut config = common::test_config(500, 0);
    config.observability.metrics_enabled = true;
    let coordinator = Coordinator::start(config).await.unwrap();
    let base = format!("http://{}", coordinator.local_addr());
    let client = common::client();

    let res = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let request_id = res
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("request id assigned");
    assert!(!request_id.is_empty());
    assert_eq!(res.text().await.unwrap(), "Hello from test-instance!\n");

    let res = client
        .get(format!("{base}/ping"))
        .header(X_REQUEST_ID, "client-chosen-id")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers().get(X_REQUEST_ID).unwrap(),
        "client-chosen-id",
        "existing request ids are propagated"
    );

    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("api_calls_total"), "{metrics}");
    assert!(metrics.contains("http_requests_total"), "{metrics}");
    assert!(metrics.contains("service_instance_id=\"test-instance\""), "{metrics}");

    coordinator.shutdown().await;
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let coordinator = Coordinator::start(common::test_config(500, 0)).await.unwrap();
    let res = common::client()
        .get(format!("http://{}/missing", coordinator.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn long_task_completes_when_no_shutdown_intervenes() {
    let mut config = common::test_config(500, 0);
    config.handlers.long_task_ms = 50;
    let coordinator = Coordinator::start(config).await.unwrap();
    let stats = coordinator.stats().clone();

    let res = common::client()
        .get(format!("http://{}/long-task", coordinator.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "completed" }));
    assert_eq!(stats.completed(), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn connections_speak_http1_only() {
    let coordinator = Coordinator::start(common::test_config(500, 0)).await.unwrap();
    let url = format!("http://{}/ping", coordinator.local_addr());

    let res = common::client().get(&url).send().await.unwrap();
    assert_eq!(res.version(), reqwest::Version::HTTP_11);

    let h2 = reqwest::Client::builder()
        .no_proxy()
        .http2_prior_knowledge()
        .build()
        .unwrap();
    assert!(h2.get(&url).send().await.is_err(), "HTTP/2 is not served");

    let report = coordinator.shutdown().await;
    assert!(report.is_graceful());
}
