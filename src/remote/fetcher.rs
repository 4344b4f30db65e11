//! Rate-limited, retrying GET fetcher.
//!
//! The platform communicates its rate budget through two numeric response
//! headers: remaining units and the epoch second at which the budget resets.
//! The fetcher retries transient failures on a fixed attempt budget, and
//! when a successful response reports the budget nearly exhausted it sleeps
//! past the reset and re-issues the same request once so the payload it
//! returns is fresh.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderMap;

use super::error::RemoteError;
use super::transport::{HttpResponse, HttpTransport};

/// Header carrying the remaining rate-limit units.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Header carrying the epoch second at which the rate budget resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

const MAX_ATTEMPTS: u32 = 3;

/// Below this many remaining units the fetcher pauses until reset.
const RATE_FLOOR: u32 = 2;

const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
const DEFAULT_RATE_LIMIT_MARGIN_SECS: u64 = 10;

/// Tunable delays for [`RateLimitedFetcher`].
///
/// The defaults match the platform contract (2 s between retry attempts,
/// 10 s of margin past the advertised reset to absorb clock skew between
/// client and remote); tests zero them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Sleep between failed attempts.
    pub retry_delay: Duration,
    /// Safety margin added to the advertised reset interval.
    pub rate_limit_margin: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            rate_limit_margin: Duration::from_secs(DEFAULT_RATE_LIMIT_MARGIN_SECS),
        }
    }
}

/// Rate-limit state extracted from response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    remaining: u32,
    reset_at: u64,
}

impl RateLimitInfo {
    /// Creates a rate-limit info value.
    #[must_use]
    pub const fn new(remaining: u32, reset_at: u64) -> Self {
        Self { remaining, reset_at }
    }

    /// Extracts rate-limit state from response headers.
    ///
    /// Returns `None` when either header is absent or non-numeric; the
    /// platform omits them on endpoints that are not rate limited.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = parse_numeric_header(headers, RATE_LIMIT_REMAINING_HEADER)?;
        let reset_at = parse_numeric_header(headers, RATE_LIMIT_RESET_HEADER)?;
        Some(Self { remaining, reset_at: reset_at.into() })
    }

    /// Returns the remaining units in the current window.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns true when the budget is low enough to require a pause.
    #[must_use]
    pub const fn needs_pause(&self) -> bool {
        self.remaining < RATE_FLOOR
    }

    /// Calculates seconds until the rate limit resets.
    ///
    /// Returns 0 if the reset time has already passed or the system time
    /// cannot be determined.
    #[must_use]
    pub fn seconds_until_reset(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0);

        self.reset_at.saturating_sub(now)
    }

    /// Computes how long to pause before re-issuing a request.
    #[must_use]
    pub fn wait_interval(&self, margin: Duration) -> Duration {
        Duration::from_secs(self.seconds_until_reset()).saturating_add(margin)
    }
}

fn parse_numeric_header(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|raw| raw.to_str().ok())
        .and_then(|text| text.parse().ok())
}

/// Retrying GET fetcher that honours the platform's rate-limit contract.
pub struct RateLimitedFetcher<'a> {
    transport: &'a dyn HttpTransport,
    config: FetcherConfig,
}

impl<'a> RateLimitedFetcher<'a> {
    /// Creates a fetcher with the default delays.
    #[must_use]
    pub fn new(transport: &'a dyn HttpTransport) -> Self {
        Self {
            transport,
            config: FetcherConfig::default(),
        }
    }

    /// Creates a fetcher with explicit delays.
    #[must_use]
    pub const fn with_config(transport: &'a dyn HttpTransport, config: FetcherConfig) -> Self {
        Self { transport, config }
    }

    /// Issues a GET request and returns the parsed JSON payload.
    ///
    /// Up to three attempts are made for non-success statuses and transport
    /// faults, sleeping between attempts. Before a successful response is
    /// returned, a nearly-exhausted rate budget triggers a sleep until the
    /// advertised reset plus the configured margin, after which the same
    /// request is issued once more so the returned payload is fresh.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::RequestFailed`] when the attempt budget is
    /// exhausted and [`RemoteError::MalformedResponse`] when a successful
    /// response body is not valid JSON.
    pub fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, RemoteError> {
        for attempt in 1..=MAX_ATTEMPTS {
            tracing::debug!(url, attempt, "sending request");

            match self.transport.get(url, query) {
                Ok(response) if response.status.is_success() => {
                    let fresh = self.pause_if_rate_limited(url, query, response)?;
                    return parse_json_body(&fresh.body);
                }
                Ok(response) => {
                    tracing::error!(
                        url,
                        status = response.status.as_u16(),
                        attempt,
                        "request returned non-success status"
                    );
                }
                Err(error) => {
                    tracing::error!(url, %error, attempt, "request transport failed");
                }
            }

            if attempt < MAX_ATTEMPTS {
                thread::sleep(self.config.retry_delay);
            }
        }

        Err(RemoteError::RequestFailed {
            url: url.to_owned(),
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Sleeps past the advertised reset and re-issues the request when the
    /// response reports fewer remaining units than the floor.
    fn pause_if_rate_limited(
        &self,
        url: &str,
        query: &[(String, String)],
        response: HttpResponse,
    ) -> Result<HttpResponse, RemoteError> {
        let Some(info) = RateLimitInfo::from_headers(&response.headers) else {
            return Ok(response);
        };
        if !info.needs_pause() {
            return Ok(response);
        }

        let wait = info.wait_interval(self.config.rate_limit_margin);
        tracing::info!(
            url,
            wait_seconds = wait.as_secs(),
            "rate budget nearly exhausted; waiting for reset"
        );
        thread::sleep(wait);

        self.transport.get(url, query)
    }
}

fn parse_json_body(body: &str) -> Result<serde_json::Value, RemoteError> {
    serde_json::from_str(body).map_err(|error| RemoteError::MalformedResponse {
        message: format!("response body is not valid JSON: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use http::{HeaderMap, HeaderValue, StatusCode};
    use mockall::predicate::{always, eq};

    use super::super::transport::{HttpResponse, MockHttpTransport};
    use super::{
        FetcherConfig, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER, RateLimitInfo,
        RateLimitedFetcher,
    };
    use crate::remote::error::RemoteError;

    fn zero_delays() -> FetcherConfig {
        FetcherConfig {
            retry_delay: Duration::ZERO,
            rate_limit_margin: Duration::ZERO,
        }
    }

    fn ok_response(body: &str) -> HttpResponse {
        HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.to_owned(),
        }
    }

    fn rate_limited_response(body: &str, remaining: u32, reset_at: u64) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            RATE_LIMIT_REMAINING_HEADER,
            HeaderValue::from_str(&remaining.to_string()).expect("numeric header value"),
        );
        headers.insert(
            RATE_LIMIT_RESET_HEADER,
            HeaderValue::from_str(&reset_at.to_string()).expect("numeric header value"),
        );
        HttpResponse {
            status: StatusCode::OK,
            headers,
            body: body.to_owned(),
        }
    }

    #[test]
    fn returns_parsed_payload_on_first_success() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_get()
            .with(eq("https://example.invalid/threads"), always())
            .times(1)
            .returning(|_, _| Ok(ok_response("[1, 2]")));

        let fetcher = RateLimitedFetcher::with_config(&transport, zero_delays());
        let payload = fetcher
            .get_json("https://example.invalid/threads", &[])
            .expect("payload should parse");

        assert_eq!(payload, serde_json::json!([1, 2]));
    }

    #[test]
    fn retries_non_success_then_succeeds() {
        let mut transport = MockHttpTransport::new();
        let mut statuses = vec![StatusCode::OK, StatusCode::BAD_GATEWAY].into_iter();
        transport.expect_get().times(2).returning(move |_, _| {
            let status = statuses.next_back().unwrap_or(StatusCode::OK);
            Ok(HttpResponse {
                status,
                headers: HeaderMap::new(),
                body: "{}".to_owned(),
            })
        });

        let fetcher = RateLimitedFetcher::with_config(&transport, zero_delays());
        let payload = fetcher
            .get_json("https://example.invalid/threads", &[])
            .expect("second attempt should succeed");

        assert_eq!(payload, serde_json::json!({}));
    }

    #[test]
    fn exhausted_attempts_escalate_to_request_failed() {
        let mut transport = MockHttpTransport::new();
        transport.expect_get().times(3).returning(|_, _| {
            Err(RemoteError::Network {
                message: "connection refused".to_owned(),
            })
        });

        let fetcher = RateLimitedFetcher::with_config(&transport, zero_delays());
        let error = fetcher
            .get_json("https://example.invalid/threads", &[])
            .expect_err("all attempts should fail");

        assert_eq!(
            error,
            RemoteError::RequestFailed {
                url: "https://example.invalid/threads".to_owned(),
                attempts: 3,
            }
        );
    }

    #[test]
    fn low_rate_budget_reissues_request_and_returns_fresh_payload() {
        let mut transport = MockHttpTransport::new();
        let mut bodies = vec!["[\"fresh\"]", "[\"stale\"]"].into_iter();
        transport.expect_get().times(2).returning(move |_, _| {
            let body = bodies.next_back().unwrap_or("[]");
            if body.contains("stale") {
                Ok(rate_limited_response(body, 1, 0))
            } else {
                Ok(ok_response(body))
            }
        });

        let fetcher = RateLimitedFetcher::with_config(&transport, zero_delays());
        let payload = fetcher
            .get_json("https://example.invalid/threads", &[])
            .expect("re-issued request should succeed");

        assert_eq!(payload, serde_json::json!(["fresh"]));
    }

    #[test]
    fn healthy_rate_budget_does_not_reissue() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_get()
            .times(1)
            .returning(|_, _| Ok(rate_limited_response("[]", 500, 0)));

        let fetcher = RateLimitedFetcher::with_config(&transport, zero_delays());
        let payload = fetcher
            .get_json("https://example.invalid/threads", &[])
            .expect("single attempt should succeed");

        assert_eq!(payload, serde_json::json!([]));
    }

    #[test]
    fn invalid_json_body_is_a_malformed_response() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_get()
            .times(1)
            .returning(|_, _| Ok(ok_response("not json")));

        let fetcher = RateLimitedFetcher::with_config(&transport, zero_delays());
        let error = fetcher
            .get_json("https://example.invalid/threads", &[])
            .expect_err("body should fail to parse");

        assert!(matches!(error, RemoteError::MalformedResponse { .. }));
    }

    #[test]
    fn seconds_until_reset_returns_zero_when_reset_has_passed() {
        let info = RateLimitInfo::new(0, 0);
        assert_eq!(info.seconds_until_reset(), 0);
    }

    #[test]
    fn seconds_until_reset_returns_positive_for_future_reset() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be available")
            .as_secs();
        let info = RateLimitInfo::new(0, now + 60);

        let seconds = info.seconds_until_reset();
        assert!(
            (1..=60).contains(&seconds),
            "expected 1..=60 seconds until reset, got {seconds}"
        );
    }
}
