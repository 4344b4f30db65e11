//! Error type for the sync engine.

use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::remote::RemoteError;

/// Errors raised while reconciling remote records into the local store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The remote platform could not be fetched.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The local store failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A raw record is missing required fields or fails validation.
    ///
    /// The reconciler never substitutes a default for a required identity
    /// field; the orchestrator logs the discrepancy and skips the record or
    /// thread.
    #[error("malformed {kind} record: {message}")]
    MalformedRecord {
        /// Raw record type that failed validation.
        kind: String,
        /// Decoding error detail.
        message: String,
    },
}

impl SyncError {
    /// Builds a malformed-record error from a serde decoding failure.
    #[must_use]
    pub fn malformed(kind: &str, error: &serde_json::Error) -> Self {
        Self::MalformedRecord {
            kind: kind.to_owned(),
            message: error.to_string(),
        }
    }
}
