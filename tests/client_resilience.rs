//! Failure injection tests for the service client and breaker stack.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use meshlink::breaker::{BreakerRegistry, BreakerState};
use meshlink::client::{BatchRequest, RequestOptions, ServiceClient};
use meshlink::config::{BreakerConfig, ClientConfig, DiscoveryConfig};
use meshlink::discovery::ServiceDiscovery;
use meshlink::error::Error;

mod common;

fn build_client(
    retry_attempts: u32,
    failure_threshold: u32,
    reset_timeout_secs: u64,
) -> (Arc<ServiceDiscovery>, Arc<BreakerRegistry>, ServiceClient) {
    let discovery = Arc::new(ServiceDiscovery::new(DiscoveryConfig::default()));
    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
        failure_threshold,
        reset_timeout_secs,
    }));
    let client = ServiceClient::new(
        ClientConfig {
            retry_attempts,
            retry_delay_ms: 10,
            request_timeout_secs: 2,
            ..Default::default()
        },
        discovery.clone(),
        breakers.clone(),
    );
    (discovery, breakers, client)
}

fn register(discovery: &ServiceDiscovery, service: &str, addr: SocketAddr) {
    discovery.register_service(
        service,
        vec![url::Url::parse(&format!("http://{}", addr)).unwrap()],
    );
}

#[tokio::test]
async fn always_failing_target_is_attempted_exactly_retry_attempts_times() {
    let addr: SocketAddr = "127.0.0.1:29101".parse().unwrap();
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    common::start_programmable_backend(addr, move || {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (503, "Service Unavailable".to_string())
        }
    })
    .await;

    let (discovery, breakers, client) = build_client(3, 10, 60);
    register(&discovery, "orders", addr);

    let result = client.get("orders", "/api/orders").await;
    match result {
        Err(Error::Status { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected status error, got {:?}", other),
    }
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    let status = breakers.get("orders").status();
    assert_eq!(status.failure_count, 3);
    assert_eq!(status.state, BreakerState::Closed);
}

#[tokio::test]
async fn recovers_when_failures_stop_before_attempts_run_out() {
    let addr: SocketAddr = "127.0.0.1:29102".parse().unwrap();
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    common::start_programmable_backend(addr, move || {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "Service Unavailable".to_string())
            } else {
                (200, json!({"ok": true}).to_string())
            }
        }
    })
    .await;

    let (discovery, breakers, client) = build_client(3, 10, 60);
    register(&discovery, "orders", addr);

    let response = client.get("orders", "/api/orders").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.data["ok"], true);
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    let status = breakers.get("orders").status();
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.failure_count, 0);
}

#[tokio::test]
async fn breaker_opens_fails_fast_and_recovers_through_half_open() {
    let addr: SocketAddr = "127.0.0.1:29103".parse().unwrap();
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    common::start_programmable_backend(addr, move || {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 3 {
                (500, "boom".to_string())
            } else {
                (200, json!({"ok": true}).to_string())
            }
        }
    })
    .await;

    // One attempt per call so every request maps to one breaker sample.
    let (discovery, breakers, client) = build_client(1, 3, 1);
    register(&discovery, "orders", addr);

    for _ in 0..3 {
        assert!(client.get("orders", "/").await.is_err());
    }
    assert_eq!(breakers.get("orders").status().state, BreakerState::Open);

    // Gate rejects without touching the network.
    let rejected = client.get("orders", "/").await;
    assert!(matches!(rejected, Err(Error::CircuitOpen { .. })));
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    // After the reset timeout a single trial is admitted and succeeds.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let response = client.get("orders", "/").await.unwrap();
    assert_eq!(response.status, 200);

    let status = breakers.get("orders").status();
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.failure_count, 0);
}

#[tokio::test]
async fn missing_instances_count_against_the_breaker_and_retry() {
    let (discovery, breakers, client) = build_client(2, 10, 60);
    discovery.register_service("ghost", vec![]);

    let result = client.get("ghost", "/").await;
    assert!(matches!(result, Err(Error::NoHealthyInstance { .. })));
    assert_eq!(breakers.get("ghost").status().failure_count, 2);
}

#[tokio::test]
async fn per_call_timeout_aborts_the_in_flight_request() {
    let addr: SocketAddr = "127.0.0.1:29104".parse().unwrap();
    common::start_programmable_backend(addr, move || async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        (200, json!({"ok": true}).to_string())
    })
    .await;

    let (discovery, _breakers, client) = build_client(1, 10, 60);
    register(&discovery, "slow", addr);

    let result = client
        .request(
            "slow",
            "/",
            RequestOptions {
                timeout: Some(Duration::from_millis(200)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Timeout { .. })));
}

#[tokio::test]
async fn batch_request_settles_every_entry_independently() {
    let ok_a: SocketAddr = "127.0.0.1:29105".parse().unwrap();
    let bad: SocketAddr = "127.0.0.1:29106".parse().unwrap();
    let ok_b: SocketAddr = "127.0.0.1:29107".parse().unwrap();
    common::start_mock_backend(ok_a, 200, r#"{"service":"a"}"#).await;
    common::start_mock_backend(bad, 500, r#"{"error":"boom"}"#).await;
    common::start_mock_backend(ok_b, 200, r#"{"service":"b"}"#).await;

    let (discovery, _breakers, client) = build_client(1, 10, 60);
    register(&discovery, "svc-a", ok_a);
    register(&discovery, "svc-bad", bad);
    register(&discovery, "svc-b", ok_b);

    let results = client
        .batch_request(vec![
            BatchRequest {
                service: "svc-a".to_string(),
                path: "/".to_string(),
                options: RequestOptions::default(),
            },
            BatchRequest {
                service: "svc-bad".to_string(),
                path: "/".to_string(),
                options: RequestOptions::default(),
            },
            BatchRequest {
                service: "svc-b".to_string(),
                path: "/".to_string(),
                options: RequestOptions::default(),
            },
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().data["service"], "a");
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().data["service"], "b");
}

#[tokio::test]
async fn health_check_reduces_errors_to_false() {
    let healthy: SocketAddr = "127.0.0.1:29108".parse().unwrap();
    let broken: SocketAddr = "127.0.0.1:29109".parse().unwrap();
    common::start_mock_backend(healthy, 200, r#"{"status":"up"}"#).await;
    common::start_mock_backend(broken, 503, r#"{"status":"down"}"#).await;

    let (discovery, _breakers, client) = build_client(1, 10, 60);
    register(&discovery, "up", healthy);
    register(&discovery, "down", broken);

    assert!(client.health_check("up").await);
    assert!(!client.health_check("down").await);
    assert!(!client.health_check("never-registered").await);
}

#[tokio::test]
async fn outbound_requests_carry_json_and_user_agent_headers() {
    let addr: SocketAddr = "127.0.0.1:29110".parse().unwrap();
    let recorded = common::start_recording_backend(addr, 200, r#"{"ok":true}"#).await;

    let (discovery, _breakers, client) = build_client(1, 10, 60);
    register(&discovery, "orders", addr);

    client
        .post("orders", "/api/orders", json!({"item": "espresso"}))
        .await
        .unwrap();

    let requests = recorded.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].header("content-type").as_deref(),
        Some("application/json")
    );
    assert!(requests[0]
        .header("user-agent")
        .is_some_and(|ua| ua.contains("meshlink")));
    assert!(requests[0].body.contains("espresso"));
}
