//! The incremental synchronization and reconciliation engine.
//!
//! One run walks the thread listing from the last watermark forward and
//! drives each thread through a fixed stage pipeline:
//!
//! `Fetched → ReviewStored → RevisionsLinked → ChangeLogsLinked →
//! CommentsLinked → Done`
//!
//! Stages are strictly sequential and synchronous. Failure at any stage
//! abandons that thread in whatever partial state it reached and the run
//! moves on — a thread-level failure is never fatal. The watermark advances
//! per listing batch, to the last thread of the longest fully-`Done`
//! prefix, so a failed thread is re-queried on the next run and idempotent
//! upsert makes the re-processing safe.

pub mod error;
pub mod identity;
pub mod reconcile;
pub mod refs;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{ChangeLogEntry, ReviewComment, ReviewThread, ReviewerSets, Revision, ThreadId};
use crate::persistence::ReviewStore;
use crate::remote::records::{RawComment, RawRevision, RawThread};
use crate::remote::{ContinuationPages, NumberedPages, RateLimitedFetcher, pagination};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

pub use error::SyncError;
pub use identity::IdentityResolver;
pub use refs::ReferenceResolver;

/// Query parameter bounding the listing to threads changed since the
/// watermark.
const UPDATED_AFTER_PARAM: &str = "updated_after";

/// What to mirror and how to scope the listing query.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Base tracking URL of the thread listing endpoint; also the watermark
    /// source key.
    pub tracking_url: String,
    /// Alternate project name to scope the listing query, when the tracking
    /// URL serves more than one project.
    pub project: Option<String>,
    /// Whether to resolve issue references from topics and descriptions.
    pub link_issues: bool,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Threads that reached the final pipeline stage.
    pub threads_synced: usize,
    /// Threads abandoned in a partial state, to be retried next run.
    pub threads_failed: usize,
    /// Watermark after the run, if any batch advanced it.
    pub watermark: Option<DateTime<Utc>>,
}

/// Drives the fetch → reconcile → link pipeline for every changed thread.
///
/// The orchestrator owns the per-run identity and reference caches; they
/// are never process-wide, so distinct projects can sync in separate
/// processes without sharing state.
pub struct SyncOrchestrator<'a> {
    fetcher: &'a RateLimitedFetcher<'a>,
    store: &'a dyn ReviewStore,
    telemetry: &'a dyn TelemetrySink,
    options: SyncOptions,
    identities: IdentityResolver,
    references: ReferenceResolver,
}

impl<'a> SyncOrchestrator<'a> {
    /// Creates an orchestrator with fresh per-run caches.
    #[must_use]
    pub fn new(
        fetcher: &'a RateLimitedFetcher<'a>,
        store: &'a dyn ReviewStore,
        telemetry: &'a dyn TelemetrySink,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            telemetry,
            options,
            identities: IdentityResolver::new(),
            references: ReferenceResolver::new(),
        }
    }

    /// Runs one full incremental sync.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Remote`] when a thread-listing page cannot be
    /// fetched (fatal: no further progress is possible) and
    /// [`SyncError::Persistence`] when the watermark cannot be read or
    /// advanced. Failures scoped to a single thread are logged and counted,
    /// not returned.
    pub fn run(&mut self) -> Result<SyncOutcome, SyncError> {
        let source = self.options.tracking_url.clone();
        let since = self.store.watermark(&source)?;

        let mut base_query = Vec::new();
        if let Some(project) = &self.options.project {
            base_query.push(("project".to_owned(), project.clone()));
        }
        if let Some(since_value) = since {
            base_query.push((UPDATED_AFTER_PARAM.to_owned(), since_value.to_rfc3339()));
        }

        tracing::info!(
            source = source.as_str(),
            since = since.map(|value| value.to_rfc3339()).as_deref(),
            "starting sync run"
        );

        let mut outcome = SyncOutcome::default();
        for batch in ContinuationPages::new(self.fetcher, source.clone(), base_query) {
            // A listing page that cannot be fetched is fatal to the run.
            let records = batch?;
            self.process_batch(&source, records, &mut outcome)?;
        }

        outcome.watermark = self.store.watermark(&source)?;
        self.telemetry.record(TelemetryEvent::SyncCompleted {
            threads_synced: outcome.threads_synced,
            threads_failed: outcome.threads_failed,
        });
        tracing::info!(
            threads_synced = outcome.threads_synced,
            threads_failed = outcome.threads_failed,
            "sync run finished"
        );
        Ok(outcome)
    }

    /// Processes one listing batch and advances the watermark behind the
    /// longest fully-synced prefix.
    fn process_batch(
        &mut self,
        source: &str,
        records: Vec<Value>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        let mut done_high_water: Option<DateTime<Utc>> = None;
        let mut batch_failed = false;

        for record in records {
            let external_hint = record
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_owned();
            let synced = serde_json::from_value::<RawThread>(record)
                .map_err(|error| SyncError::malformed("thread", &error))
                .and_then(|thread| self.sync_thread(&thread));

            match synced {
                Ok(updated_at) => {
                    outcome.threads_synced += 1;
                    if !batch_failed {
                        done_high_water = Some(updated_at);
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        thread = external_hint.as_str(),
                        %error,
                        "thread sync failed; leaving partial state for the next run"
                    );
                    outcome.threads_failed += 1;
                    batch_failed = true;
                }
            }
        }

        if let Some(updated_at) = done_high_water {
            self.store.advance_watermark(source, updated_at)?;
            self.telemetry.record(TelemetryEvent::WatermarkAdvanced {
                source: source.to_owned(),
                updated_at: updated_at.to_rfc3339(),
            });
        }
        Ok(())
    }

    /// Runs the stage pipeline for one thread and returns its `updated_at`
    /// on `Done`.
    fn sync_thread(&mut self, raw: &RawThread) -> Result<DateTime<Utc>, SyncError> {
        let thread_id = self.store_review(raw)?;
        self.link_revisions(thread_id, raw)?;
        self.link_change_logs(thread_id, raw)?;
        self.link_comments(thread_id, raw)?;
        Ok(raw.updated)
    }

    /// `ReviewStored`: resolves the thread's references and upserts it.
    fn store_review(&mut self, raw: &RawThread) -> Result<ThreadId, SyncError> {
        let author_id = Some(self.identities.resolve(self.store, &raw.owner)?);
        let submitter_id = raw
            .submitter
            .as_ref()
            .map(|account| self.identities.resolve(self.store, account))
            .transpose()?;

        let linked_issue_ids = if self.options.link_issues {
            self.references.linked_issues(
                self.store,
                raw.topic.as_deref(),
                raw.description.as_deref(),
            )?
        } else {
            Vec::new()
        };

        let incoming = ReviewThread {
            id: None,
            external_id: raw.id.clone(),
            title: raw.title.clone(),
            description: raw.description.clone(),
            status: raw.status,
            branch: raw.branch.clone(),
            is_draft: raw.is_draft,
            current_commit_hash: raw.current_commit_hash(),
            author_id,
            submitter_id,
            linked_issue_ids,
            created_at: raw.created,
            updated_at: raw.updated,
            submitted_at: raw.submitted,
            closed_at: raw.closed,
        };
        reconcile::reconcile_thread(self.store, incoming)
    }

    /// `RevisionsLinked`: upserts revisions in sequence order and primes the
    /// revision-number cache.
    fn link_revisions(&mut self, thread_id: ThreadId, raw: &RawThread) -> Result<(), SyncError> {
        let mut ordered: Vec<(&String, &RawRevision)> = raw.revisions.iter().collect();
        ordered.sort_by_key(|(_, revision)| revision.number);

        for (external_id, raw_revision) in ordered {
            let author_id = raw_revision
                .author
                .as_ref()
                .map(|account| self.identities.resolve(self.store, account))
                .transpose()?;
            let submitter_id = raw_revision
                .submitter
                .as_ref()
                .map(|account| self.identities.resolve(self.store, account))
                .transpose()?;
            let reviewers = self.resolve_reviewer_sets(raw_revision)?;

            let incoming = Revision {
                id: None,
                thread_id,
                external_id: external_id.clone(),
                number: raw_revision.number,
                commit_hash: raw_revision.commit.clone(),
                description: raw_revision.description.clone(),
                author_id,
                submitter_id,
                reviewers,
                created_at: raw_revision.created,
                updated_at: raw_revision.updated,
                submitted_at: raw_revision.submitted,
            };
            let revision_id = reconcile::reconcile_revision(self.store, incoming)?;
            self.references
                .record_revision(thread_id, raw_revision.number, revision_id);
        }
        Ok(())
    }

    /// Recomputes the reviewer sets wholesale from the raw payload.
    fn resolve_reviewer_sets(&mut self, raw: &RawRevision) -> Result<ReviewerSets, SyncError> {
        let mut sets = ReviewerSets::default();
        for account in &raw.requested_reviewers {
            sets.requested
                .insert(self.identities.resolve(self.store, account)?);
        }
        for account in &raw.removed_reviewers {
            sets.removed
                .insert(self.identities.resolve(self.store, account)?);
        }
        for account in &raw.cc {
            sets.cc.insert(self.identities.resolve(self.store, account)?);
        }
        Ok(sets)
    }

    /// `ChangeLogsLinked`: upserts the thread's change-log entries, batching
    /// the strictly-new ones.
    fn link_change_logs(&mut self, thread_id: ThreadId, raw: &RawThread) -> Result<(), SyncError> {
        let mut reconciler = reconcile::ChangeLogReconciler::new();
        for message in &raw.messages {
            let author_id = message
                .author
                .as_ref()
                .map(|account| self.identities.resolve(self.store, account))
                .transpose()?;
            let revision_id = match message.revision_number {
                Some(number) => self.references.revision_id(self.store, thread_id, number)?,
                None => None,
            };

            let incoming = ChangeLogEntry {
                id: None,
                thread_id,
                external_id: message.id.clone(),
                revision_id,
                author_id,
                message: message.message.clone(),
                created_at: message.date,
            };
            reconciler.upsert(self.store, incoming)?;
        }
        reconciler.flush(self.store)?;
        Ok(())
    }

    /// `CommentsLinked`: fetches the thread's comment pages and upserts each
    /// comment, resolving reply parents through placeholders.
    fn link_comments(&mut self, thread_id: ThreadId, raw: &RawThread) -> Result<(), SyncError> {
        let comments_url = format!(
            "{}/{}/comments",
            self.options.tracking_url.trim_end_matches('/'),
            raw.id
        );
        let records = pagination::collect_records(NumberedPages::new(
            self.fetcher,
            comments_url,
            Vec::new(),
        ))?;

        let mut reconciler = reconcile::CommentReconciler::new();
        for record in records {
            let comment = match serde_json::from_value::<RawComment>(record) {
                Ok(comment) => comment,
                Err(error) => {
                    let malformed = SyncError::malformed("comment", &error);
                    tracing::warn!(
                        thread = raw.id.as_str(),
                        error = %malformed,
                        "skipping malformed comment record"
                    );
                    continue;
                }
            };

            let author_id = comment
                .author
                .as_ref()
                .map(|account| self.identities.resolve(self.store, account))
                .transpose()?;
            let revision_id = match comment.patch_set {
                Some(number) => self.references.revision_id(self.store, thread_id, number)?,
                None => None,
            };
            let in_reply_to_id = match comment.in_reply_to.as_deref() {
                Some(parent_external_id) => {
                    if reconciler.pending_contains(parent_external_id) {
                        // The parent is still queued without an id; flush so
                        // the reply can reference it.
                        reconciler.flush(self.store)?;
                    }
                    Some(
                        self.references
                            .reply_target(self.store, thread_id, parent_external_id)?,
                    )
                }
                None => None,
            };

            let incoming = ReviewComment {
                id: None,
                thread_id,
                external_id: comment.id.clone(),
                revision_id,
                file_path: comment.path.clone(),
                line: comment.line,
                author_id,
                message: comment.message.clone(),
                in_reply_to_id,
                created_at: comment.created,
                updated_at: comment.updated,
            };
            reconciler.upsert(self.store, incoming)?;
        }
        reconciler.flush(self.store)?;
        Ok(())
    }
}
