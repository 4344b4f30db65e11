//! Fetcher behaviour against a real HTTP server.
//!
//! The engine's client is blocking, so each scenario drives it from
//! `spawn_blocking` while wiremock serves responses on the async side.

use std::time::Duration;

use revue::remote::{FetcherConfig, RateLimitedFetcher, RemoteCredentials, ReqwestTransport};
use revue::RemoteError;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn zero_delays() -> FetcherConfig {
    FetcherConfig {
        retry_delay: Duration::ZERO,
        rate_limit_margin: Duration::ZERO,
    }
}

async fn fetch_json(url: String) -> Result<Value, RemoteError> {
    tokio::task::spawn_blocking(move || {
        let transport = ReqwestTransport::new(RemoteCredentials::Token("tok".to_owned()), None)
            .expect("client should build");
        let fetcher = RateLimitedFetcher::with_config(&transport, zero_delays());
        fetcher.get_json(&url, &[])
    })
    .await
    .expect("blocking fetch should join")
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "t-1"}])))
        .mount(&server)
        .await;

    let payload = fetch_json(format!("{}/threads", server.uri()))
        .await
        .expect("third attempt should succeed");

    assert_eq!(payload, json!([{"id": "t-1"}]));
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 3);
}

#[tokio::test]
async fn exhausted_retries_escalate_as_request_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let error = fetch_json(format!("{}/threads", server.uri()))
        .await
        .expect_err("all attempts should fail");

    assert!(matches!(
        error,
        RemoteError::RequestFailed { attempts: 3, .. }
    ));
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 3);
}

#[tokio::test]
async fn a_nearly_exhausted_rate_budget_reissues_for_a_fresh_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "1")
                .insert_header("x-ratelimit-reset", "0")
                .set_body_json(json!(["stale"])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["fresh"])))
        .mount(&server)
        .await;

    let payload = fetch_json(format!("{}/threads", server.uri()))
        .await
        .expect("re-issued request should succeed");

    assert_eq!(payload, json!(["fresh"]));
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 2);
}

#[tokio::test]
async fn token_credentials_ride_the_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .and(header("authorization", "token tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let payload = fetch_json(format!("{}/threads", server.uri()))
        .await
        .expect("authorised request should succeed");

    assert_eq!(payload, json!([]));
}
