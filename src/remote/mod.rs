//! Remote review-platform access: transport, rate-limited fetching,
//! pagination, and raw record validation.
//!
//! Everything here is read-only with respect to the platform. The engine in
//! [`crate::sync`] consumes validated records; it never sees HTTP details.

pub mod error;
pub mod fetcher;
pub mod pagination;
pub mod records;
pub mod transport;

pub use error::RemoteError;
pub use fetcher::{FetcherConfig, RateLimitInfo, RateLimitedFetcher};
pub use pagination::{BULK_PAGE_SIZE, ContinuationPages, NumberedPages, REVIEW_PAGE_SIZE};
pub use records::{RawAccount, RawChangeMessage, RawComment, RawRevision, RawThread};
pub use transport::{HttpResponse, HttpTransport, RemoteCredentials, ReqwestTransport};
