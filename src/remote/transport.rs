//! Synchronous HTTP transport collaborator.
//!
//! The sync engine only ever issues GET requests, so the transport surface
//! is a single-method trait. The production implementation wraps
//! `reqwest::blocking`; tests substitute a mock or a scripted stub.

use std::time::Duration;

use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};

use super::error::RemoteError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A raw HTTP response as seen by the fetcher.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers, including the rate-limit headers when present.
    pub headers: HeaderMap,
    /// Response body text.
    pub body: String,
}

/// Synchronous GET transport to the review platform.
#[cfg_attr(test, mockall::automock)]
pub trait HttpTransport {
    /// Issues one GET request with the given query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Network`] on transport-level failure. A
    /// non-success HTTP status is not an error at this layer; the fetcher
    /// decides whether to retry it.
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, RemoteError>;
}

/// Credentials presented to the review platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCredentials {
    /// Token authentication via the `Authorization: token …` header.
    Token(String),
    /// HTTP basic authentication.
    Basic {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
}

/// Production transport backed by a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    credentials: RemoteCredentials,
}

impl ReqwestTransport {
    /// Builds a transport with the given credentials and optional proxy URL.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ClientBuild`] when the proxy URL is rejected or
    /// the underlying client cannot be constructed.
    pub fn new(
        credentials: RemoteCredentials,
        proxy_url: Option<&str>,
    ) -> Result<Self, RemoteError> {
        let mut builder =
            reqwest::blocking::Client::builder().timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        if let Some(proxy_url_value) = proxy_url {
            let proxy =
                reqwest::Proxy::all(proxy_url_value).map_err(|error| RemoteError::ClientBuild {
                    message: format!("invalid proxy URL: {error}"),
                })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|error| RemoteError::ClientBuild {
            message: error.to_string(),
        })?;

        Ok(Self {
            client,
            credentials,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, RemoteError> {
        let request = self.client.get(url).query(query);
        let request = match &self.credentials {
            RemoteCredentials::Token(token) => {
                request.header(AUTHORIZATION, format!("token {token}"))
            }
            RemoteCredentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };

        let response = request.send().map_err(|error| RemoteError::Network {
            message: error.to_string(),
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().map_err(|error| RemoteError::Network {
            message: format!("failed to read response body: {error}"),
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
