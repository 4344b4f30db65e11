//! Cross-entity reference resolution.
//!
//! Raw payloads reference other entities in three shapes: a change-log
//! entry or comment names its revision by sequence number, a thread names
//! issues through its topic and free-text description, and a comment names
//! its reply parent by external id. Only the last is a true forward
//! reference (a reply can be fetched before its parent); it is resolved by
//! persisting an empty placeholder immediately so the parent's local id is
//! stable before the real content arrives.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{CommentId, IssueId, ReviewComment, RevisionId, ThreadId};
use crate::persistence::ReviewStore;

use super::error::SyncError;

static BUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile_pattern(r"(?i)bug:? *#?(\d+)"));

static BLUEPRINT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compile_pattern(r"(?i)(?:bp|blueprint)(?::? |/)((?:\w+-?)+)"));

#[expect(
    clippy::expect_used,
    reason = "patterns are fixed at compile time and covered by tests"
)]
fn compile_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).expect("issue reference pattern should compile")
}

/// Extracts candidate issue external ids from a topic and a description.
///
/// Candidates come from the last `/`-segment of the structured topic field
/// and from `bug`/`blueprint` markers in the free text. Extraction is
/// syntactic only; whether a candidate names a real issue is decided by the
/// store lookup in [`ReferenceResolver::linked_issues`].
#[must_use]
pub fn issue_candidates(topic: Option<&str>, description: Option<&str>) -> Vec<String> {
    let mut candidates = Vec::new();

    if let Some(topic_value) = topic {
        if let Some(segment) = topic_value.rsplit('/').next() {
            let trimmed = segment.trim();
            if !trimmed.is_empty() {
                candidates.push(trimmed.to_owned());
            }
        }
    }

    if let Some(text) = description {
        for pattern in [&BUG_PATTERN, &BLUEPRINT_PATTERN] {
            for capture in pattern.captures_iter(text) {
                if let Some(reference) = capture.get(1) {
                    let candidate = reference.as_str().to_owned();
                    if !candidates.contains(&candidate) {
                        candidates.push(candidate);
                    }
                }
            }
        }
    }

    candidates
}

/// Resolves revision, issue, and reply-chain references for one sync run.
#[derive(Debug, Default)]
pub struct ReferenceResolver {
    revisions: HashMap<(ThreadId, i64), RevisionId>,
}

impl ReferenceResolver {
    /// Creates a resolver with an empty revision cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Primes the revision cache after a revision upsert.
    pub fn record_revision(&mut self, thread_id: ThreadId, number: i64, id: RevisionId) {
        self.revisions.insert((thread_id, number), id);
    }

    /// Resolves a revision by owning thread and sequence number.
    ///
    /// Cached per `(thread, number)` for the run; falls back to a store
    /// lookup. `Ok(None)` means the payload references a revision that was
    /// never mirrored — callers store an absent reference, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when the store lookup fails.
    pub fn revision_id(
        &mut self,
        store: &dyn ReviewStore,
        thread_id: ThreadId,
        number: i64,
    ) -> Result<Option<RevisionId>, SyncError> {
        if let Some(cached) = self.revisions.get(&(thread_id, number)) {
            return Ok(Some(*cached));
        }

        let Some(revision) = store.find_revision_by_number(thread_id, number)? else {
            return Ok(None);
        };
        if let Some(id) = revision.id {
            self.revisions.insert((thread_id, number), id);
            return Ok(Some(id));
        }
        Ok(None)
    }

    /// Resolves the issues a thread references.
    ///
    /// Each candidate is looked up independently; candidates that do not
    /// name a mirrored issue are silently dropped — a thread may legitimately
    /// reference zero, one, or many issues.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when a store lookup fails.
    pub fn linked_issues(
        &self,
        store: &dyn ReviewStore,
        topic: Option<&str>,
        description: Option<&str>,
    ) -> Result<Vec<IssueId>, SyncError> {
        let mut issue_ids = Vec::new();
        for candidate in issue_candidates(topic, description) {
            match store.find_issue(&candidate)? {
                Some(issue) => {
                    if !issue_ids.contains(&issue.id) {
                        issue_ids.push(issue.id);
                    }
                }
                None => {
                    tracing::debug!(
                        candidate = candidate.as_str(),
                        "issue candidate not mirrored locally; dropped"
                    );
                }
            }
        }
        Ok(issue_ids)
    }

    /// Resolves the parent of a reply comment.
    ///
    /// When the target has not been fetched yet, an empty placeholder is
    /// persisted immediately so its id is stable and derivable before the
    /// real content arrives later in the same page or a subsequent one; the
    /// real comment then overwrites the placeholder by natural key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when the lookup or placeholder
    /// write fails.
    pub fn reply_target(
        &self,
        store: &dyn ReviewStore,
        thread_id: ThreadId,
        remote_comment_id: &str,
    ) -> Result<CommentId, SyncError> {
        if let Some(ReviewComment { id: Some(id), .. }) =
            store.find_comment(thread_id, remote_comment_id)?
        {
            return Ok(id);
        }

        let mut placeholder = ReviewComment::placeholder(thread_id, remote_comment_id.to_owned());
        let id = store.save_comment(&mut placeholder)?;
        tracing::debug!(
            thread_id = thread_id.get(),
            comment = remote_comment_id,
            "persisted placeholder for forward reference"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ReferenceResolver, issue_candidates};
    use crate::model::ThreadId;
    use crate::persistence::{MemoryStore, ReviewStore};

    #[rstest]
    #[case::bug_and_blueprint(
        None,
        Some("Fixes bug: #4821 and bp/improve-caching"),
        vec!["4821", "improve-caching"]
    )]
    #[case::topic_last_segment(
        Some("caching/improve-caching"),
        None,
        vec!["improve-caching"]
    )]
    #[case::case_insensitive_markers(
        None,
        Some("BUG #17 relates to Blueprint: cold-start"),
        vec!["17", "cold-start"]
    )]
    #[case::no_markers(None, Some("plain description"), Vec::<&str>::new())]
    #[case::duplicates_collapse(
        Some("work/4821"),
        Some("bug: 4821"),
        vec!["4821"]
    )]
    fn candidate_extraction(
        #[case] topic: Option<&str>,
        #[case] description: Option<&str>,
        #[case] expected: Vec<&str>,
    ) {
        assert_eq!(issue_candidates(topic, description), expected);
    }

    #[test]
    fn unmatched_candidates_are_dropped_and_matches_resolve() {
        let store = MemoryStore::new();
        let mirrored = store.seed_issue("4821", "Cache eviction race");
        let resolver = ReferenceResolver::new();

        let linked = resolver
            .linked_issues(
                &store,
                None,
                Some("Fixes bug: #4821 and bp/improve-caching"),
            )
            .expect("lookup should succeed");

        assert_eq!(linked, vec![mirrored.id]);
    }

    #[test]
    fn reply_target_creates_one_placeholder_and_reuses_it() {
        let store = MemoryStore::new();
        let resolver = ReferenceResolver::new();
        let thread_id = ThreadId::new(1);

        let first = resolver
            .reply_target(&store, thread_id, "comment-9")
            .expect("placeholder creation should succeed");
        let second = resolver
            .reply_target(&store, thread_id, "comment-9")
            .expect("placeholder lookup should succeed");

        assert_eq!(first, second);
        assert_eq!(store.comments().len(), 1);
        let placeholder = store
            .find_comment(thread_id, "comment-9")
            .expect("lookup should succeed")
            .expect("placeholder should exist");
        assert!(placeholder.message.is_none());
        assert!(placeholder.author_id.is_none());
    }
}
