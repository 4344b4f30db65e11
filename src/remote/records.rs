//! Raw wire records returned by the review platform.
//!
//! Payloads are heterogeneous JSON; each record type is validated once at
//! ingress by deserializing into the typed structs here, so nothing
//! downstream handles untyped maps. Types prefixed with `Raw` are
//! deserialization targets only — the normalized domain entities live in
//! [`crate::model`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::ThreadStatus;

/// A platform account reference embedded in other records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawAccount {
    /// Numeric account id, the remote actor identifier.
    #[serde(rename = "_account_id")]
    pub account_id: i64,
    /// Display name, absent for service accounts.
    pub name: Option<String>,
    /// Email address; the platform withholds it in some contexts.
    pub email: Option<String>,
    /// Username; absent when only an email is exposed.
    pub username: Option<String>,
}

/// One revision inside a thread's `revisions` map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRevision {
    /// Sequence number within the thread.
    #[serde(rename = "_number")]
    pub number: i64,
    /// Hash of the uploaded commit.
    pub commit: Option<String>,
    /// Revision description.
    pub description: Option<String>,
    /// Uploading account.
    pub author: Option<RawAccount>,
    /// Submitting account.
    pub submitter: Option<RawAccount>,
    /// Accounts requested to review this revision.
    #[serde(default)]
    pub requested_reviewers: Vec<RawAccount>,
    /// Accounts removed from the reviewer list.
    #[serde(default)]
    pub removed_reviewers: Vec<RawAccount>,
    /// Accounts carbon-copied.
    #[serde(default)]
    pub cc: Vec<RawAccount>,
    /// Creation timestamp.
    pub created: Option<DateTime<Utc>>,
    /// Last-update timestamp.
    pub updated: Option<DateTime<Utc>>,
    /// Submission timestamp.
    pub submitted: Option<DateTime<Utc>>,
}

/// One change-log message on a thread.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawChangeMessage {
    /// Message id, unique per thread.
    pub id: String,
    /// Authoring account.
    pub author: Option<RawAccount>,
    /// Free-text message.
    pub message: Option<String>,
    /// Revision number the message was produced against.
    #[serde(rename = "_revision_number")]
    pub revision_number: Option<i64>,
    /// Message timestamp.
    pub date: Option<DateTime<Utc>>,
}

/// One inline review comment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawComment {
    /// Comment id, unique per thread.
    pub id: String,
    /// File the comment is attached to.
    pub path: Option<String>,
    /// Line within the file.
    pub line: Option<i64>,
    /// Authoring account.
    pub author: Option<RawAccount>,
    /// Comment body.
    pub message: Option<String>,
    /// Revision number the comment was left on.
    pub patch_set: Option<i64>,
    /// Id of the comment this one replies to.
    ///
    /// The referenced comment may not have been fetched yet — replies can
    /// arrive before their parents.
    pub in_reply_to: Option<String>,
    /// Creation timestamp.
    pub created: Option<DateTime<Utc>>,
    /// Last-update timestamp.
    pub updated: Option<DateTime<Utc>>,
}

/// A full review thread as returned by the listing endpoint.
///
/// Revisions arrive as a nested map keyed by revision identifier and the
/// change log as a `messages` array; inline comments are a separate
/// endpoint. Listing continuation (`_more` on the final element) is read by
/// the page cursor before records reach this type, so it has no field here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawThread {
    /// Thread id, the external identity key.
    pub id: String,
    /// Thread title.
    pub title: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Lifecycle state; an unknown value fails validation.
    pub status: ThreadStatus,
    /// Structured topic, a `/`-separated path whose last segment may name
    /// an issue.
    pub topic: Option<String>,
    /// Target branch name.
    pub branch: Option<String>,
    /// Draft marker.
    #[serde(default)]
    pub is_draft: bool,
    /// Thread owner.
    pub owner: RawAccount,
    /// Submitting account, present once merged.
    pub submitter: Option<RawAccount>,
    /// Identifier of the current head revision.
    pub current_revision: Option<String>,
    /// Revisions keyed by revision identifier.
    #[serde(default)]
    pub revisions: BTreeMap<String, RawRevision>,
    /// Change-log messages.
    #[serde(default)]
    pub messages: Vec<RawChangeMessage>,
    /// Creation timestamp.
    pub created: Option<DateTime<Utc>>,
    /// Last-update timestamp; required, it drives the watermark.
    pub updated: DateTime<Utc>,
    /// Submission timestamp.
    pub submitted: Option<DateTime<Utc>>,
    /// Close timestamp.
    pub closed: Option<DateTime<Utc>>,
}

impl RawThread {
    /// Returns the commit hash of the current head revision, if the
    /// payload carries both the pointer and the revision it points at.
    #[must_use]
    pub fn current_commit_hash(&self) -> Option<String> {
        let current = self.current_revision.as_deref()?;
        self.revisions
            .get(current)
            .and_then(|revision| revision.commit.clone())
    }
}
