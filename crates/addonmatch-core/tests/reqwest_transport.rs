//! The reqwest transport against a local mock server.

use std::time::Duration;

use addonmatch_core::net::{HttpRequest, NetworkError, ReqwestTransport, Transport};
use httpmock::prelude::*;
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn get_returns_body_and_disables_caching() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/addon/1")
                .header("cache-control", "no-cache")
                .header("pragma", "no-cache")
                .header("x-api-key", "secret");
            then.status(200).body(r#"{"id":1}"#);
        })
        .await;
    let transport = ReqwestTransport::new().unwrap();

    let body = transport
        .execute(HttpRequest::get(server.url("/addon/1"), TIMEOUT).with_header("x-api-key", "secret"))
        .await
        .unwrap();

    assert_eq!(body, r#"{"id":1}"#);
    mock.assert_async().await;
}

#[tokio::test]
async fn error_status_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;
    let transport = ReqwestTransport::new().unwrap();

    let err = transport
        .execute(HttpRequest::get(server.url("/missing"), TIMEOUT))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/fingerprint")
                .json_body(json!({"fingerprints": [1, 2]}));
            then.status(200).body(r#"{"exactMatches":[]}"#);
        })
        .await;
    let transport = ReqwestTransport::new().unwrap();

    let body = transport
        .execute(HttpRequest::post(
            server.url("/fingerprint"),
            json!({"fingerprints": [1, 2]}),
            TIMEOUT,
        ))
        .await
        .unwrap();

    assert_eq!(body, r#"{"exactMatches":[]}"#);
    mock.assert_async().await;
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(2)).body("late");
        })
        .await;
    let transport = ReqwestTransport::new().unwrap();

    let err = transport
        .execute(HttpRequest::get(server.url("/slow"), Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert!(matches!(err, NetworkError::Timeout { .. }));
}
