//! Store collaborator interface consumed by the sync engine.

use chrono::{DateTime, Utc};

use crate::model::{
    ChangeLogEntry, ChangeLogId, CommentId, Issue, Person, ReviewComment, ReviewThread, Revision,
    RevisionId, ThreadId,
};

use super::PersistenceError;

/// Lookup-by-key / insert-or-replace persistence used by reconciliation.
///
/// Every `find_*` returns `Ok(None)` for a missing record — not-found is a
/// normal branch. Every `save_*` inserts when the value has no local id yet
/// and updates in place when it does, assigning the id back into the value
/// and returning it. The `insert_many_*` methods batch strictly-new records
/// of one type to reduce write round-trips; callers must not pass records
/// that already have ids.
pub trait ReviewStore {
    /// Looks up a person by verified email and display name.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails.
    fn find_person_by_email(
        &self,
        email: &str,
        name: &str,
    ) -> Result<Option<Person>, PersistenceError>;

    /// Looks up a person by username and display name.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails.
    fn find_person_by_username(
        &self,
        username: &str,
        name: &str,
    ) -> Result<Option<Person>, PersistenceError>;

    /// Inserts a new person record and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn insert_person(
        &self,
        name: &str,
        email: &str,
        username: &str,
    ) -> Result<Person, PersistenceError>;

    /// Looks up a review thread by its external id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails or a stored row
    /// cannot be decoded.
    fn find_thread(&self, external_id: &str) -> Result<Option<ReviewThread>, PersistenceError>;

    /// Inserts or updates a thread, replacing its issue links wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn save_thread(&self, thread: &mut ReviewThread) -> Result<ThreadId, PersistenceError>;

    /// Looks up a revision by owning thread and external id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails or a stored row
    /// cannot be decoded.
    fn find_revision(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<Revision>, PersistenceError>;

    /// Looks up a revision by owning thread and sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails or a stored row
    /// cannot be decoded.
    fn find_revision_by_number(
        &self,
        thread_id: ThreadId,
        number: i64,
    ) -> Result<Option<Revision>, PersistenceError>;

    /// Inserts or updates a revision, replacing its reviewer sets wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn save_revision(&self, revision: &mut Revision) -> Result<RevisionId, PersistenceError>;

    /// Looks up a change-log entry by owning thread and external id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails or a stored row
    /// cannot be decoded.
    fn find_change_log(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<ChangeLogEntry>, PersistenceError>;

    /// Inserts or updates one change-log entry.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn save_change_log(&self, entry: &mut ChangeLogEntry) -> Result<ChangeLogId, PersistenceError>;

    /// Batch-inserts strictly-new change-log entries, assigning their ids.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn insert_change_logs(
        &self,
        entries: &mut [ChangeLogEntry],
    ) -> Result<(), PersistenceError>;

    /// Looks up a review comment by owning thread and external id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails or a stored row
    /// cannot be decoded.
    fn find_comment(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<ReviewComment>, PersistenceError>;

    /// Inserts or updates one review comment.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn save_comment(&self, comment: &mut ReviewComment) -> Result<CommentId, PersistenceError>;

    /// Batch-inserts strictly-new review comments, assigning their ids.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn insert_comments(&self, comments: &mut [ReviewComment]) -> Result<(), PersistenceError>;

    /// Looks up an issue by its external id.
    ///
    /// Issues are mirrored by a sibling tool; revue never writes them.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails.
    fn find_issue(&self, external_id: &str) -> Result<Option<Issue>, PersistenceError>;

    /// Returns the watermark recorded for a remote source, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the query fails or the stored
    /// timestamp cannot be decoded.
    fn watermark(&self, source: &str) -> Result<Option<DateTime<Utc>>, PersistenceError>;

    /// Advances the watermark for a remote source.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn advance_watermark(
        &self,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
}
