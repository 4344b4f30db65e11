//! Idempotent find-or-create reconciliation.
//!
//! Every upsert locates the existing record by natural key first, carries
//! its local id over, and saves — so re-running a pipeline over unchanged
//! payloads converges without duplicates. Set-valued fields ride along on
//! the incoming value and are replaced wholesale by the store. Strictly-new
//! change-log entries and comments within one thread pass are accumulated
//! and written in one batch; existing records are saved individually.

use crate::model::{ChangeLogEntry, ReviewComment, ReviewThread, Revision, RevisionId, ThreadId};
use crate::persistence::ReviewStore;

use super::error::SyncError;

/// Upserts a thread by its external id.
///
/// # Errors
///
/// Returns [`SyncError::Persistence`] when the lookup or write fails.
pub fn reconcile_thread(
    store: &dyn ReviewStore,
    mut incoming: ReviewThread,
) -> Result<ThreadId, SyncError> {
    if let Some(existing) = store.find_thread(&incoming.external_id)? {
        incoming.id = existing.id;
    }
    Ok(store.save_thread(&mut incoming)?)
}

/// Upserts a revision by `(thread, external id)`.
///
/// # Errors
///
/// Returns [`SyncError::Persistence`] when the lookup or write fails.
pub fn reconcile_revision(
    store: &dyn ReviewStore,
    mut incoming: Revision,
) -> Result<RevisionId, SyncError> {
    if let Some(existing) = store.find_revision(incoming.thread_id, &incoming.external_id)? {
        incoming.id = existing.id;
    }
    Ok(store.save_revision(&mut incoming)?)
}

/// Batching upserter for one thread's change-log pass.
#[derive(Debug, Default)]
pub struct ChangeLogReconciler {
    pending: Vec<ChangeLogEntry>,
}

impl ChangeLogReconciler {
    /// Creates an empty reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts one entry: existing entries are saved immediately, new ones
    /// are queued for the next [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when the lookup or write fails.
    pub fn upsert(
        &mut self,
        store: &dyn ReviewStore,
        incoming: ChangeLogEntry,
    ) -> Result<(), SyncError> {
        match store.find_change_log(incoming.thread_id, &incoming.external_id)? {
            Some(existing) => {
                let mut updated = incoming;
                updated.id = existing.id;
                store.save_change_log(&mut updated)?;
            }
            None => self.pending.push(incoming),
        }
        Ok(())
    }

    /// Writes all queued entries in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when the batch write fails.
    pub fn flush(&mut self, store: &dyn ReviewStore) -> Result<usize, SyncError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        store.insert_change_logs(&mut self.pending)?;
        let written = self.pending.len();
        self.pending.clear();
        Ok(written)
    }
}

/// Batching upserter for one thread's comment pass.
#[derive(Debug, Default)]
pub struct CommentReconciler {
    pending: Vec<ReviewComment>,
}

impl CommentReconciler {
    /// Creates an empty reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when a queued comment carries this external id.
    ///
    /// A reply whose parent is still queued forces an early flush so the
    /// parent's id is assigned before the reply resolves it.
    #[must_use]
    pub fn pending_contains(&self, external_id: &str) -> bool {
        self.pending
            .iter()
            .any(|comment| comment.external_id == external_id)
    }

    /// Upserts one comment: existing comments (including placeholders left
    /// by forward references) are overwritten in place, new ones are queued
    /// for the next [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when the lookup or write fails.
    pub fn upsert(
        &mut self,
        store: &dyn ReviewStore,
        incoming: ReviewComment,
    ) -> Result<(), SyncError> {
        match store.find_comment(incoming.thread_id, &incoming.external_id)? {
            Some(existing) => {
                let mut updated = incoming;
                updated.id = existing.id;
                store.save_comment(&mut updated)?;
            }
            None => self.pending.push(incoming),
        }
        Ok(())
    }

    /// Writes all queued comments in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when the batch write fails.
    pub fn flush(&mut self, store: &dyn ReviewStore) -> Result<usize, SyncError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        store.insert_comments(&mut self.pending)?;
        let written = self.pending.len();
        self.pending.clear();
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{CommentReconciler, reconcile_thread};
    use crate::model::{ReviewComment, ReviewThread, ThreadId, ThreadStatus};
    use crate::persistence::MemoryStore;

    fn thread(external_id: &str, title: &str) -> ReviewThread {
        ReviewThread {
            id: None,
            external_id: external_id.to_owned(),
            title: Some(title.to_owned()),
            description: None,
            status: ThreadStatus::Open,
            branch: None,
            is_draft: false,
            current_commit_hash: None,
            author_id: None,
            submitter_id: None,
            linked_issue_ids: Vec::new(),
            created_at: None,
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid"),
            submitted_at: None,
            closed_at: None,
        }
    }

    fn comment(thread_id: ThreadId, external_id: &str, message: &str) -> ReviewComment {
        let mut value = ReviewComment::placeholder(thread_id, external_id.to_owned());
        value.message = Some(message.to_owned());
        value
    }

    #[test]
    fn re_reconciling_a_thread_updates_in_place() {
        let store = MemoryStore::new();

        let first = reconcile_thread(&store, thread("t-1", "before")).expect("first save");
        let second = reconcile_thread(&store, thread("t-1", "after")).expect("second save");

        assert_eq!(first, second);
        let stored = store.threads();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored.first().and_then(|value| value.title.as_deref()),
            Some("after")
        );
    }

    #[test]
    fn new_comments_batch_and_existing_comments_save_individually() {
        let store = MemoryStore::new();
        let thread_id = ThreadId::new(1);
        let mut reconciler = CommentReconciler::new();

        reconciler
            .upsert(&store, comment(thread_id, "c-1", "first"))
            .expect("queue new comment");
        reconciler
            .upsert(&store, comment(thread_id, "c-2", "second"))
            .expect("queue new comment");
        assert!(reconciler.pending_contains("c-1"));
        assert!(store.comments().is_empty());

        let written = reconciler.flush(&store).expect("flush batch");
        assert_eq!(written, 2);
        assert_eq!(store.comments().len(), 2);

        reconciler
            .upsert(&store, comment(thread_id, "c-1", "first, edited"))
            .expect("update existing comment");
        assert_eq!(store.comments().len(), 2);
        let flushed = reconciler.flush(&store).expect("flush no-op");
        assert_eq!(flushed, 0);
    }
}
