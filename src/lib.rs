//! Revue library crate: an incremental mirror of a code-review platform's
//! thread history.
//!
//! The engine paginates the remote listing under a rate budget, validates
//! raw records once at ingress, resolves identities and cross-entity
//! references (including forward references to not-yet-seen comments), and
//! performs idempotent upserts into a local `SQLite` store so repeated runs
//! converge without duplication. Progress is resumable through a per-source
//! watermark.

pub mod config;
pub mod model;
pub mod persistence;
pub mod remote;
pub mod sync;
pub mod telemetry;

pub use config::RevueConfig;
pub use persistence::{PersistenceError, ReviewStore, SqliteStore, migrate_database};
pub use remote::{
    FetcherConfig, HttpTransport, RateLimitedFetcher, RemoteCredentials, RemoteError,
    ReqwestTransport,
};
pub use sync::{SyncError, SyncOptions, SyncOrchestrator, SyncOutcome};
