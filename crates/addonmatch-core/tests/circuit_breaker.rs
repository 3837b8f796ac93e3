//! Circuit breaker behavior as seen through a catalog client.

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use addonmatch_core::net::{CircuitState, HttpMethod, NetworkError};
use futures::future::join_all;
use serde_json::{Value, json};

use support::{FakeTransport, Reply, client, network_config};

const URL: &str = "https://catalog.test/api/fingerprint";

async fn post(client: &addonmatch_core::net::CatalogClient) -> Result<Value, NetworkError> {
    client.post_json::<Value>(URL, json!({"fingerprints": [1]}), false).await
}

#[tokio::test(start_paused = true)]
async fn opens_after_threshold_and_fails_fast() {
    let transport = FakeTransport::new();
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Status(503));
    let client = client("catalog", Arc::clone(&transport), network_config(3));

    for _ in 0..3 {
        let err = post(&client).await.unwrap_err();
        assert!(matches!(err, NetworkError::Status { status: 503, .. }));
    }
    assert_eq!(client.breaker().state(), CircuitState::Open);
    assert!(!client.is_available());

    let err = post(&client).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn timeouts_count_as_failures() {
    let transport = FakeTransport::new();
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Hang);
    let client = client("catalog", Arc::clone(&transport), network_config(2));

    for _ in 0..2 {
        let err = post(&client).await.unwrap_err();
        assert!(matches!(err, NetworkError::Timeout { .. }));
    }
    assert_eq!(client.breaker().state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn client_errors_do_not_trip() {
    let transport = FakeTransport::new();
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Status(404));
    let client = client("catalog", Arc::clone(&transport), network_config(1));

    for _ in 0..5 {
        assert!(post(&client).await.unwrap_err().is_not_found());
    }
    assert_eq!(client.breaker().state(), CircuitState::Closed);
    assert_eq!(transport.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn half_open_admits_exactly_one_trial() {
    let transport = FakeTransport::new();
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Status(500));
    let client = client("catalog", Arc::clone(&transport), network_config(1));

    assert!(post(&client).await.is_err());
    assert_eq!(client.breaker().state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(client.is_available());

    transport.route(HttpMethod::Post, "/fingerprint", Reply::Json(json!({"ok": true})));
    transport.set_delay(Duration::from_secs(1));

    let results = join_all((0..5).map(|_| post(&client))).await;

    let admitted: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(err) if err.is_circuit_open()))
        .count();
    assert_eq!(admitted.len(), 1);
    assert_eq!(rejected, 4);
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_reopens() {
    let transport = FakeTransport::new();
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Status(502));
    let client = client("catalog", Arc::clone(&transport), network_config(1));

    assert!(post(&client).await.is_err());
    tokio::time::advance(Duration::from_secs(30)).await;

    let err = post(&client).await.unwrap_err();
    assert!(matches!(err, NetworkError::Status { status: 502, .. }));
    assert_eq!(client.breaker().state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(post(&client).await.unwrap_err().is_circuit_open());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn listeners_observe_full_cycle() {
    let transport = FakeTransport::new();
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Status(503));
    let client = client("catalog", Arc::clone(&transport), network_config(2));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.breaker().on_state_change(move |event| {
        sink.lock().unwrap().push((event.name.clone(), event.from, event.to));
    });

    let _ = post(&client).await;
    let _ = post(&client).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Json(json!([])));
    post(&client).await.unwrap();

    let name = "catalog".to_string();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (name.clone(), CircuitState::Closed, CircuitState::Open),
            (name.clone(), CircuitState::Open, CircuitState::HalfOpen),
            (name, CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}
