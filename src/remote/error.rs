//! Error types surfaced by the remote platform layer.

use thiserror::Error;

/// Errors raised while configuring or talking to the remote review platform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// No tracking URL was configured.
    #[error("tracking URL is required (use --tracking-url or REVUE_TRACKING_URL)")]
    MissingTrackingUrl,

    /// The tracking URL could not be parsed.
    #[error("tracking URL is invalid: {0}")]
    InvalidTrackingUrl(String),

    /// Neither a token nor username+password credentials were supplied.
    #[error("credentials are required (a token, or username and password)")]
    MissingCredentials,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    ClientBuild {
        /// Error detail from the client builder.
        message: String,
    },

    /// Networking failed while calling the platform.
    #[error("network error talking to the review platform: {message}")]
    Network {
        /// Transport-level error detail.
        message: String,
    },

    /// Every retry attempt for one request was exhausted.
    ///
    /// Callers treat this as fatal for the page being fetched; it is never
    /// silently skipped.
    #[error("request to {url} failed after {attempts} attempts")]
    RequestFailed {
        /// URL of the failing request.
        url: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The response body was not the JSON shape the endpoint promises.
    #[error("malformed response from the review platform: {message}")]
    MalformedResponse {
        /// Decoding error detail.
        message: String,
    },
}
