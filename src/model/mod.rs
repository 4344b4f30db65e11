//! Normalized domain entities mirrored from the remote review platform.
//!
//! Every entity carries the remote `external_id` it was reconciled from as
//! its natural key, plus a local row id assigned by the store on first save.
//! Types here are plain data; reconciliation rules live in [`crate::sync`]
//! and persistence in [`crate::persistence`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local row id of a person record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersonId(i64);

impl PersonId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the numeric row id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Local row id of a review thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(i64);

impl ThreadId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the numeric row id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Local row id of a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevisionId(i64);

impl RevisionId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the numeric row id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Local row id of a change-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeLogId(i64);

impl ChangeLogId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the numeric row id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Local row id of a review comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommentId(i64);

impl CommentId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the numeric row id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Local row id of an issue record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IssueId(i64);

impl IssueId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the numeric row id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Lifecycle state of a review thread.
///
/// The wire vocabulary is closed; an unknown state in a raw payload is a
/// malformed record, never coerced to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    /// Under active review.
    Open,
    /// Merged into the target branch.
    Merged,
    /// Abandoned by its owner.
    Abandoned,
    /// Closed without merging.
    Closed,
}

impl ThreadStatus {
    /// Returns the canonical lowercase wire/storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Abandoned => "abandoned",
            Self::Closed => "closed",
        }
    }

    /// Parses a stored status name back into the enum.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "merged" => Some(Self::Merged),
            "abandoned" => Some(Self::Abandoned),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Membership role a person holds in a revision's reviewer sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReviewerRole {
    /// Requested to review the revision.
    Requested,
    /// Removed from the reviewer list.
    Removed,
    /// Carbon-copied for visibility only.
    Cc,
}

impl ReviewerRole {
    /// Returns the storage name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Removed => "removed",
            Self::Cc => "cc",
        }
    }

    /// Parses a stored role name back into the enum.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requested" => Some(Self::Requested),
            "removed" => Some(Self::Removed),
            "cc" => Some(Self::Cc),
            _ => None,
        }
    }
}

/// A resolved person identity.
///
/// The natural key is the full `(name, email, username)` triple; absent raw
/// fields are synthesized before lookup (see [`crate::sync::IdentityResolver`]),
/// so stored values are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    /// Local row id.
    pub id: PersonId,
    /// Display name.
    pub name: String,
    /// Email address, possibly synthesized.
    pub email: String,
    /// Platform username, possibly derived.
    pub username: String,
}

/// An issue known to the local store.
///
/// Issues are mirrored by a sibling tool; revue only looks them up when
/// linking threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Local row id.
    pub id: IssueId,
    /// Identifier of the issue on the remote tracker.
    pub external_id: String,
    /// Issue title if mirrored.
    pub title: Option<String>,
}

/// A mirrored review thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewThread {
    /// Local row id, `None` until first saved.
    pub id: Option<ThreadId>,
    /// Identifier of the thread on the remote platform.
    pub external_id: String,
    /// Thread title.
    pub title: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: ThreadStatus,
    /// Target branch name.
    pub branch: Option<String>,
    /// Whether the thread is marked as a draft.
    pub is_draft: bool,
    /// Hash of the current head commit.
    pub current_commit_hash: Option<String>,
    /// Thread author.
    pub author_id: Option<PersonId>,
    /// Person who submitted (merged) the thread.
    pub submitter_id: Option<PersonId>,
    /// Issues this thread references; replaced wholesale on each sync.
    pub linked_issue_ids: Vec<IssueId>,
    /// Remote creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Remote last-update timestamp; drives the incremental watermark.
    pub updated_at: DateTime<Utc>,
    /// Remote submission timestamp.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Remote close timestamp.
    pub closed_at: Option<DateTime<Utc>>,
}

/// The three reviewer membership sets attached to a revision.
///
/// Sets, not sequences: ordering carries no meaning and each sync replaces
/// the stored membership wholesale so remote removals are reflected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewerSets {
    /// People requested to review.
    pub requested: BTreeSet<PersonId>,
    /// People removed from the reviewer list.
    pub removed: BTreeSet<PersonId>,
    /// People carbon-copied.
    pub cc: BTreeSet<PersonId>,
}

impl ReviewerSets {
    /// Iterates all memberships as `(role, person)` pairs.
    pub fn memberships(&self) -> impl Iterator<Item = (ReviewerRole, PersonId)> + '_ {
        let requested = self
            .requested
            .iter()
            .map(|person| (ReviewerRole::Requested, *person));
        let removed = self
            .removed
            .iter()
            .map(|person| (ReviewerRole::Removed, *person));
        let cc = self.cc.iter().map(|person| (ReviewerRole::Cc, *person));
        requested.chain(removed).chain(cc)
    }
}

/// A mirrored revision of a review thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Local row id, `None` until first saved.
    pub id: Option<RevisionId>,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Identifier of the revision on the remote platform, unique per thread.
    pub external_id: String,
    /// Sequence number within the thread.
    pub number: i64,
    /// Hash of the commit this revision uploaded.
    pub commit_hash: Option<String>,
    /// Revision description.
    pub description: Option<String>,
    /// Revision author.
    pub author_id: Option<PersonId>,
    /// Person who submitted the revision.
    pub submitter_id: Option<PersonId>,
    /// Reviewer membership sets.
    pub reviewers: ReviewerSets,
    /// Remote creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Remote last-update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
    /// Remote submission timestamp.
    pub submitted_at: Option<DateTime<Utc>>,
}

/// A mirrored change-log entry (review message) on a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry {
    /// Local row id, `None` until first saved.
    pub id: Option<ChangeLogId>,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Identifier of the entry on the remote platform, unique per thread.
    pub external_id: String,
    /// Revision the entry was produced against.
    pub revision_id: Option<RevisionId>,
    /// Entry author.
    pub author_id: Option<PersonId>,
    /// Free-text message.
    pub message: Option<String>,
    /// Remote timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

/// A mirrored inline review comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    /// Local row id, `None` until first saved.
    pub id: Option<CommentId>,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Identifier of the comment on the remote platform, unique per thread.
    pub external_id: String,
    /// Revision the comment was left on.
    pub revision_id: Option<RevisionId>,
    /// File the comment is attached to.
    pub file_path: Option<String>,
    /// Line within the file.
    pub line: Option<i64>,
    /// Comment author.
    pub author_id: Option<PersonId>,
    /// Comment body.
    pub message: Option<String>,
    /// Parent comment in the reply chain, if any.
    pub in_reply_to_id: Option<CommentId>,
    /// Remote creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Remote last-update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReviewComment {
    /// Builds the empty placeholder persisted for a forward reference.
    ///
    /// Only the natural key is populated; the real comment overwrites every
    /// other field when it is reconciled later.
    #[must_use]
    pub const fn placeholder(thread_id: ThreadId, external_id: String) -> Self {
        Self {
            id: None,
            thread_id,
            external_id,
            revision_id: None,
            file_path: None,
            line: None,
            author_id: None,
            message: None,
            in_reply_to_id: None,
            created_at: None,
            updated_at: None,
        }
    }
}
