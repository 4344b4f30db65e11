//! Migration bootstrap and `SQLite` store round-trips on a real database
//! file.

mod support;

use chrono::{DateTime, Utc};
use revue::model::{
    PersonId, ReviewComment, ReviewThread, ReviewerSets, Revision, ThreadId, ThreadStatus,
};
use revue::persistence::ReviewStore;
use revue::telemetry::NoopTelemetrySink;
use revue::{SqliteStore, migrate_database};
use tempfile::TempDir;

fn timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("fixture timestamp should parse")
        .with_timezone(&Utc)
}

fn migrated_store() -> (TempDir, SqliteStore) {
    let directory = support::create_temp_dir();
    let database_path = directory.path().join("revue.sqlite");
    let database_url = database_path.to_string_lossy().into_owned();

    migrate_database(&database_url, &NoopTelemetrySink).expect("migrations should apply");
    let store = SqliteStore::new(database_url).expect("store should build");
    (directory, store)
}

fn thread(external_id: &str, title: &str) -> ReviewThread {
    ReviewThread {
        id: None,
        external_id: external_id.to_owned(),
        title: Some(title.to_owned()),
        description: None,
        status: ThreadStatus::Open,
        branch: Some("main".to_owned()),
        is_draft: false,
        current_commit_hash: Some("9c48853f".to_owned()),
        author_id: None,
        submitter_id: None,
        linked_issue_ids: Vec::new(),
        created_at: Some(timestamp("2026-02-27T09:00:00Z")),
        updated_at: timestamp("2026-03-01T12:00:00Z"),
        submitted_at: None,
        closed_at: None,
    }
}

fn revision(thread_id: ThreadId, external_id: &str, number: i64) -> Revision {
    Revision {
        id: None,
        thread_id,
        external_id: external_id.to_owned(),
        number,
        commit_hash: Some("6dcb09b5".to_owned()),
        description: None,
        author_id: None,
        submitter_id: None,
        reviewers: ReviewerSets::default(),
        created_at: None,
        updated_at: None,
        submitted_at: None,
    }
}

#[test]
fn person_lookups_fall_back_from_email_to_username() {
    let (_directory, store) = migrated_store();

    let inserted = store
        .insert_person("Mona Lisa", "mona@example.org", "mona")
        .expect("insert should succeed");

    let by_email = store
        .find_person_by_email("mona@example.org", "Mona Lisa")
        .expect("lookup should succeed");
    assert_eq!(by_email.as_ref().map(|person| person.id), Some(inserted.id));

    let by_username = store
        .find_person_by_username("mona", "Mona Lisa")
        .expect("lookup should succeed");
    assert_eq!(by_username.map(|person| person.id), Some(inserted.id));

    let missing = store
        .find_person_by_email("nobody@example.org", "Nobody")
        .expect("lookup should succeed");
    assert!(missing.is_none(), "not-found is a normal branch");
}

#[test]
fn saving_a_thread_twice_updates_in_place_and_replaces_issue_links() {
    let (_directory, store) = migrated_store();
    let first_issue = store
        .seed_issue("4821", "Cache eviction race")
        .expect("seed should succeed");
    let second_issue = store
        .seed_issue("4900", "Cold start latency")
        .expect("seed should succeed");

    let mut incoming = thread("t-1", "before");
    incoming.linked_issue_ids = vec![first_issue.id, second_issue.id];
    let first_id = store.save_thread(&mut incoming).expect("insert");

    let mut updated = thread("t-1", "after");
    updated.id = Some(first_id);
    updated.linked_issue_ids = vec![second_issue.id];
    let second_id = store.save_thread(&mut updated).expect("update");

    assert_eq!(first_id, second_id);
    let stored = store
        .find_thread("t-1")
        .expect("lookup should succeed")
        .expect("thread should exist");
    assert_eq!(stored.title.as_deref(), Some("after"));
    assert_eq!(stored.linked_issue_ids, vec![second_issue.id]);
    assert_eq!(stored.updated_at, timestamp("2026-03-01T12:00:00Z"));
}

#[test]
fn revision_reviewer_sets_are_replaced_wholesale() {
    let (_directory, store) = migrated_store();
    let mut owner = thread("t-1", "thread");
    let thread_id = store.save_thread(&mut owner).expect("thread insert");

    let xavier = store
        .insert_person("Xavier Holt", "xavier@example.org", "xavier")
        .expect("insert");
    let yuki = store
        .insert_person("Yuki Tanaka", "yuki@example.org", "yuki")
        .expect("insert");

    let mut incoming = revision(thread_id, "rev-1", 1);
    incoming.reviewers.requested.insert(xavier.id);
    incoming.reviewers.requested.insert(yuki.id);
    let revision_id = store.save_revision(&mut incoming).expect("insert");

    let mut resynced = revision(thread_id, "rev-1", 1);
    resynced.id = Some(revision_id);
    resynced.reviewers.requested.insert(xavier.id);
    store.save_revision(&mut resynced).expect("update");

    let stored = store
        .find_revision(thread_id, "rev-1")
        .expect("lookup should succeed")
        .expect("revision should exist");
    let requested: Vec<PersonId> = stored.reviewers.requested.iter().copied().collect();
    assert_eq!(requested, vec![xavier.id]);
    assert!(stored.reviewers.removed.is_empty());

    let by_number = store
        .find_revision_by_number(thread_id, 1)
        .expect("lookup should succeed")
        .expect("revision should resolve by number");
    assert_eq!(by_number.id, Some(revision_id));
}

#[test]
fn a_placeholder_comment_is_overwritten_by_the_real_content() {
    let (_directory, store) = migrated_store();
    let mut owner = thread("t-1", "thread");
    let thread_id = store.save_thread(&mut owner).expect("thread insert");

    let mut placeholder = ReviewComment::placeholder(thread_id, "c-root".to_owned());
    let placeholder_id = store.save_comment(&mut placeholder).expect("placeholder");

    let mut real = ReviewComment::placeholder(thread_id, "c-root".to_owned());
    real.id = Some(placeholder_id);
    real.message = Some("Is this eviction safe under load?".to_owned());
    real.file_path = Some("src/cache.rs".to_owned());
    real.line = Some(42);
    store.save_comment(&mut real).expect("overwrite");

    let stored = store
        .find_comment(thread_id, "c-root")
        .expect("lookup should succeed")
        .expect("comment should exist");
    assert_eq!(stored.id, Some(placeholder_id));
    assert_eq!(
        stored.message.as_deref(),
        Some("Is this eviction safe under load?")
    );
}

#[test]
fn batch_inserts_assign_ids_to_every_new_comment() {
    let (_directory, store) = migrated_store();
    let mut owner = thread("t-1", "thread");
    let thread_id = store.save_thread(&mut owner).expect("thread insert");

    let mut batch = vec![
        ReviewComment::placeholder(thread_id, "c-1".to_owned()),
        ReviewComment::placeholder(thread_id, "c-2".to_owned()),
        ReviewComment::placeholder(thread_id, "c-3".to_owned()),
    ];
    store.insert_comments(&mut batch).expect("batch insert");

    assert!(batch.iter().all(|comment| comment.id.is_some()));
    for comment in &batch {
        let stored = store
            .find_comment(thread_id, &comment.external_id)
            .expect("lookup should succeed")
            .expect("comment should exist");
        assert_eq!(stored.id, comment.id);
    }
}

#[test]
fn the_watermark_upserts_per_source() {
    let (_directory, store) = migrated_store();
    let source = "https://review.example.invalid/api/threads";

    assert_eq!(store.watermark(source).expect("read"), None);

    store
        .advance_watermark(source, timestamp("2026-03-01T10:00:00Z"))
        .expect("first advance");
    store
        .advance_watermark(source, timestamp("2026-03-01T12:00:00Z"))
        .expect("second advance");

    assert_eq!(
        store.watermark(source).expect("read"),
        Some(timestamp("2026-03-01T12:00:00Z"))
    );
}
