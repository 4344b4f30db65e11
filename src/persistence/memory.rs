//! In-memory [`ReviewStore`] used by tests.
//!
//! Mirrors the `SQLite` store's observable semantics (lookup by natural
//! key, id assignment on first save, wholesale replacement of set-valued
//! fields) without any I/O, so pipeline properties can be asserted against
//! plain vectors.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::model::{
    ChangeLogEntry, ChangeLogId, CommentId, Issue, IssueId, Person, PersonId, ReviewComment,
    ReviewThread, Revision, RevisionId, ThreadId,
};

use super::PersistenceError;
use super::store::ReviewStore;

#[derive(Debug, Default)]
struct MemoryState {
    persons: Vec<Person>,
    threads: Vec<ReviewThread>,
    revisions: Vec<Revision>,
    change_logs: Vec<ChangeLogEntry>,
    comments: Vec<ReviewComment>,
    issues: Vec<Issue>,
    watermarks: HashMap<String, DateTime<Utc>>,
    next_id: i64,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store for exercising the sync pipeline in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an issue record, standing in for the sibling issue mirror.
    pub fn seed_issue(&self, external_id: &str, title: &str) -> Issue {
        let mut state = self.state();
        let issue = Issue {
            id: IssueId::new(state.allocate_id()),
            external_id: external_id.to_owned(),
            title: Some(title.to_owned()),
        };
        state.issues.push(issue.clone());
        issue
    }

    /// Returns a snapshot of all person records.
    #[must_use]
    pub fn persons(&self) -> Vec<Person> {
        self.state().persons.clone()
    }

    /// Returns a snapshot of all threads.
    #[must_use]
    pub fn threads(&self) -> Vec<ReviewThread> {
        self.state().threads.clone()
    }

    /// Returns a snapshot of all revisions.
    #[must_use]
    pub fn revisions(&self) -> Vec<Revision> {
        self.state().revisions.clone()
    }

    /// Returns a snapshot of all change-log entries.
    #[must_use]
    pub fn change_logs(&self) -> Vec<ChangeLogEntry> {
        self.state().change_logs.clone()
    }

    /// Returns a snapshot of all review comments.
    #[must_use]
    pub fn comments(&self) -> Vec<ReviewComment> {
        self.state().comments.clone()
    }
}

impl ReviewStore for MemoryStore {
    fn find_person_by_email(
        &self,
        email: &str,
        name: &str,
    ) -> Result<Option<Person>, PersistenceError> {
        Ok(self
            .state()
            .persons
            .iter()
            .find(|person| person.email == email && person.name == name)
            .cloned())
    }

    fn find_person_by_username(
        &self,
        username: &str,
        name: &str,
    ) -> Result<Option<Person>, PersistenceError> {
        Ok(self
            .state()
            .persons
            .iter()
            .find(|person| person.username == username && person.name == name)
            .cloned())
    }

    fn insert_person(
        &self,
        name: &str,
        email: &str,
        username: &str,
    ) -> Result<Person, PersistenceError> {
        let mut state = self.state();
        let person = Person {
            id: PersonId::new(state.allocate_id()),
            name: name.to_owned(),
            email: email.to_owned(),
            username: username.to_owned(),
        };
        state.persons.push(person.clone());
        Ok(person)
    }

    fn find_thread(&self, external_id: &str) -> Result<Option<ReviewThread>, PersistenceError> {
        Ok(self
            .state()
            .threads
            .iter()
            .find(|thread| thread.external_id == external_id)
            .cloned())
    }

    fn save_thread(&self, thread: &mut ReviewThread) -> Result<ThreadId, PersistenceError> {
        let mut state = self.state();
        if let Some(id) = thread.id {
            if let Some(stored) = state.threads.iter_mut().find(|stored| stored.id == Some(id)) {
                *stored = thread.clone();
            }
            Ok(id)
        } else {
            let id = ThreadId::new(state.allocate_id());
            thread.id = Some(id);
            state.threads.push(thread.clone());
            Ok(id)
        }
    }

    fn find_revision(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<Revision>, PersistenceError> {
        Ok(self
            .state()
            .revisions
            .iter()
            .find(|revision| {
                revision.thread_id == thread_id && revision.external_id == external_id
            })
            .cloned())
    }

    fn find_revision_by_number(
        &self,
        thread_id: ThreadId,
        number: i64,
    ) -> Result<Option<Revision>, PersistenceError> {
        Ok(self
            .state()
            .revisions
            .iter()
            .find(|revision| revision.thread_id == thread_id && revision.number == number)
            .cloned())
    }

    fn save_revision(&self, revision: &mut Revision) -> Result<RevisionId, PersistenceError> {
        let mut state = self.state();
        if let Some(id) = revision.id {
            if let Some(stored) = state
                .revisions
                .iter_mut()
                .find(|stored| stored.id == Some(id))
            {
                *stored = revision.clone();
            }
            Ok(id)
        } else {
            let id = RevisionId::new(state.allocate_id());
            revision.id = Some(id);
            state.revisions.push(revision.clone());
            Ok(id)
        }
    }

    fn find_change_log(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<ChangeLogEntry>, PersistenceError> {
        Ok(self
            .state()
            .change_logs
            .iter()
            .find(|entry| entry.thread_id == thread_id && entry.external_id == external_id)
            .cloned())
    }

    fn save_change_log(&self, entry: &mut ChangeLogEntry) -> Result<ChangeLogId, PersistenceError> {
        let mut state = self.state();
        if let Some(id) = entry.id {
            if let Some(stored) = state
                .change_logs
                .iter_mut()
                .find(|stored| stored.id == Some(id))
            {
                *stored = entry.clone();
            }
            Ok(id)
        } else {
            let id = ChangeLogId::new(state.allocate_id());
            entry.id = Some(id);
            state.change_logs.push(entry.clone());
            Ok(id)
        }
    }

    fn insert_change_logs(
        &self,
        entries: &mut [ChangeLogEntry],
    ) -> Result<(), PersistenceError> {
        let mut state = self.state();
        for entry in entries.iter_mut() {
            let id = ChangeLogId::new(state.allocate_id());
            entry.id = Some(id);
            state.change_logs.push(entry.clone());
        }
        Ok(())
    }

    fn find_comment(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<ReviewComment>, PersistenceError> {
        Ok(self
            .state()
            .comments
            .iter()
            .find(|comment| comment.thread_id == thread_id && comment.external_id == external_id)
            .cloned())
    }

    fn save_comment(&self, comment: &mut ReviewComment) -> Result<CommentId, PersistenceError> {
        let mut state = self.state();
        if let Some(id) = comment.id {
            if let Some(stored) = state
                .comments
                .iter_mut()
                .find(|stored| stored.id == Some(id))
            {
                *stored = comment.clone();
            }
            Ok(id)
        } else {
            let id = CommentId::new(state.allocate_id());
            comment.id = Some(id);
            state.comments.push(comment.clone());
            Ok(id)
        }
    }

    fn insert_comments(&self, comments: &mut [ReviewComment]) -> Result<(), PersistenceError> {
        let mut state = self.state();
        for comment in comments.iter_mut() {
            let id = CommentId::new(state.allocate_id());
            comment.id = Some(id);
            state.comments.push(comment.clone());
        }
        Ok(())
    }

    fn find_issue(&self, external_id: &str) -> Result<Option<Issue>, PersistenceError> {
        Ok(self
            .state()
            .issues
            .iter()
            .find(|issue| issue.external_id == external_id)
            .cloned())
    }

    fn watermark(&self, source: &str) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        Ok(self.state().watermarks.get(source).copied())
    }

    fn advance_watermark(
        &self,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.state()
            .watermarks
            .insert(source.to_owned(), updated_at);
        Ok(())
    }
}
