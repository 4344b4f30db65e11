//! `SQLite`-backed review store.
//!
//! Access goes through raw SQL with explicit binds; the schema is owned by
//! the embedded migrations. Each operation opens its own connection (the
//! engine is sequential, so there is no pooling pressure), enables foreign
//! keys, and runs inside a transaction when it touches more than one table.

use chrono::{DateTime, Utc};
use diesel::Connection;
use diesel::OptionalExtension;
use diesel::QueryableByName;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel::sqlite::SqliteConnection;

use crate::model::{
    ChangeLogEntry, ChangeLogId, CommentId, Issue, IssueId, Person, PersonId, ReviewComment,
    ReviewThread, ReviewerRole, ReviewerSets, Revision, RevisionId, ThreadId, ThreadStatus,
};

use super::PersistenceError;
use super::store::ReviewStore;

/// Table probed to distinguish "schema missing" from genuine query faults.
const SCHEMA_PROBE_TABLE: &str = "review_thread";

/// `SQLite`-backed implementation of [`ReviewStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    database_url: String,
}

impl SqliteStore {
    /// Creates a store targeting the configured `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::BlankDatabaseUrl`] when the URL is blank.
    pub fn new(database_url: impl Into<String>) -> Result<Self, PersistenceError> {
        let database_url_string = database_url.into();
        if database_url_string.trim().is_empty() {
            return Err(PersistenceError::BlankDatabaseUrl);
        }
        Ok(Self {
            database_url: database_url_string,
        })
    }

    fn establish_connection(&self) -> Result<SqliteConnection, PersistenceError> {
        let mut connection = SqliteConnection::establish(&self.database_url).map_err(|error| {
            PersistenceError::ConnectionFailed {
                message: error.to_string(),
            }
        })?;

        sql_query("PRAGMA foreign_keys = ON;")
            .execute(&mut connection)
            .map(drop)
            .map_err(|error| PersistenceError::ForeignKeysEnableFailed {
                message: error.to_string(),
            })?;

        Ok(connection)
    }

    fn probe_table_exists(
        connection: &mut SqliteConnection,
    ) -> Result<bool, diesel::result::Error> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            count: i64,
        }

        let row: Row = sql_query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?;",
        )
        .bind::<Text, _>(SCHEMA_PROBE_TABLE)
        .get_result(connection)?;

        Ok(row.count > 0)
    }

    fn map_error_with_schema_check<F>(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
        create_error: F,
    ) -> PersistenceError
    where
        F: Fn(String) -> PersistenceError,
    {
        match Self::probe_table_exists(connection) {
            Ok(false) => PersistenceError::SchemaNotInitialised,
            Ok(true) => create_error(error.to_string()),
            Err(check_error) => create_error(format!(
                "schema presence check failed: {check_error}; original error: {error}"
            )),
        }
    }

    fn map_query_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> PersistenceError {
        Self::map_error_with_schema_check(connection, error, |message| {
            PersistenceError::QueryFailed { message }
        })
    }

    fn map_write_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> PersistenceError {
        Self::map_error_with_schema_check(connection, error, |message| {
            PersistenceError::WriteFailed { message }
        })
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn format_optional_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(format_timestamp)
}

fn parse_timestamp(text: &str, column: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| PersistenceError::CorruptRow {
            message: format!("column {column} holds invalid timestamp {text:?}: {error}"),
        })
}

fn parse_optional_timestamp(
    text: Option<&str>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, PersistenceError> {
    text.map(|value| parse_timestamp(value, column)).transpose()
}

fn last_insert_rowid(connection: &mut SqliteConnection) -> Result<i64, diesel::result::Error> {
    #[derive(Debug, QueryableByName)]
    struct Row {
        #[diesel(sql_type = BigInt)]
        id: i64,
    }

    let row: Row = sql_query("SELECT last_insert_rowid() AS id;").get_result(connection)?;
    Ok(row.id)
}

#[derive(Debug, QueryableByName)]
struct PersonRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    email: String,
    #[diesel(sql_type = Text)]
    username: String,
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Self {
            id: PersonId::new(row.id),
            name: row.name,
            email: row.email,
            username: row.username,
        }
    }
}

#[derive(Debug, QueryableByName)]
struct ThreadRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    external_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    title: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    description: Option<String>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Nullable<Text>)]
    branch: Option<String>,
    #[diesel(sql_type = Bool)]
    is_draft: bool,
    #[diesel(sql_type = Nullable<Text>)]
    current_commit_hash: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    author_id: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    submitter_id: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    created_at: Option<String>,
    #[diesel(sql_type = Text)]
    updated_at: String,
    #[diesel(sql_type = Nullable<Text>)]
    submitted_at: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    closed_at: Option<String>,
}

impl ThreadRow {
    fn into_thread(self, linked_issue_ids: Vec<IssueId>) -> Result<ReviewThread, PersistenceError> {
        let status = ThreadStatus::parse(&self.status).ok_or_else(|| {
            PersistenceError::CorruptRow {
                message: format!("unknown thread status {:?}", self.status),
            }
        })?;

        Ok(ReviewThread {
            id: Some(ThreadId::new(self.id)),
            external_id: self.external_id,
            title: self.title,
            description: self.description,
            status,
            branch: self.branch,
            is_draft: self.is_draft,
            current_commit_hash: self.current_commit_hash,
            author_id: self.author_id.map(PersonId::new),
            submitter_id: self.submitter_id.map(PersonId::new),
            linked_issue_ids,
            created_at: parse_optional_timestamp(self.created_at.as_deref(), "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "updated_at")?,
            submitted_at: parse_optional_timestamp(self.submitted_at.as_deref(), "submitted_at")?,
            closed_at: parse_optional_timestamp(self.closed_at.as_deref(), "closed_at")?,
        })
    }
}

#[derive(Debug, QueryableByName)]
struct RevisionRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    thread_id: i64,
    #[diesel(sql_type = Text)]
    external_id: String,
    #[diesel(sql_type = BigInt)]
    number: i64,
    #[diesel(sql_type = Nullable<Text>)]
    commit_hash: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    description: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    author_id: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    submitter_id: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    created_at: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    updated_at: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    submitted_at: Option<String>,
}

impl RevisionRow {
    fn into_revision(self, reviewers: ReviewerSets) -> Result<Revision, PersistenceError> {
        Ok(Revision {
            id: Some(RevisionId::new(self.id)),
            thread_id: ThreadId::new(self.thread_id),
            external_id: self.external_id,
            number: self.number,
            commit_hash: self.commit_hash,
            description: self.description,
            author_id: self.author_id.map(PersonId::new),
            submitter_id: self.submitter_id.map(PersonId::new),
            reviewers,
            created_at: parse_optional_timestamp(self.created_at.as_deref(), "created_at")?,
            updated_at: parse_optional_timestamp(self.updated_at.as_deref(), "updated_at")?,
            submitted_at: parse_optional_timestamp(self.submitted_at.as_deref(), "submitted_at")?,
        })
    }
}

#[derive(Debug, QueryableByName)]
struct ChangeLogRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    thread_id: i64,
    #[diesel(sql_type = Text)]
    external_id: String,
    #[diesel(sql_type = Nullable<BigInt>)]
    revision_id: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    author_id: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    message: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    created_at: Option<String>,
}

impl ChangeLogRow {
    fn into_entry(self) -> Result<ChangeLogEntry, PersistenceError> {
        Ok(ChangeLogEntry {
            id: Some(ChangeLogId::new(self.id)),
            thread_id: ThreadId::new(self.thread_id),
            external_id: self.external_id,
            revision_id: self.revision_id.map(RevisionId::new),
            author_id: self.author_id.map(PersonId::new),
            message: self.message,
            created_at: parse_optional_timestamp(self.created_at.as_deref(), "created_at")?,
        })
    }
}

#[derive(Debug, QueryableByName)]
struct CommentRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    thread_id: i64,
    #[diesel(sql_type = Text)]
    external_id: String,
    #[diesel(sql_type = Nullable<BigInt>)]
    revision_id: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    file_path: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    line: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    author_id: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    message: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    in_reply_to_id: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    created_at: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    updated_at: Option<String>,
}

impl CommentRow {
    fn into_comment(self) -> Result<ReviewComment, PersistenceError> {
        Ok(ReviewComment {
            id: Some(CommentId::new(self.id)),
            thread_id: ThreadId::new(self.thread_id),
            external_id: self.external_id,
            revision_id: self.revision_id.map(RevisionId::new),
            file_path: self.file_path,
            line: self.line,
            author_id: self.author_id.map(PersonId::new),
            message: self.message,
            in_reply_to_id: self.in_reply_to_id.map(CommentId::new),
            created_at: parse_optional_timestamp(self.created_at.as_deref(), "created_at")?,
            updated_at: parse_optional_timestamp(self.updated_at.as_deref(), "updated_at")?,
        })
    }
}

#[derive(Debug, QueryableByName)]
struct ReviewerRow {
    #[diesel(sql_type = BigInt)]
    person_id: i64,
    #[diesel(sql_type = Text)]
    role: String,
}

fn reviewer_sets_from_rows(rows: Vec<ReviewerRow>) -> Result<ReviewerSets, PersistenceError> {
    let mut sets = ReviewerSets::default();
    for row in rows {
        let role = ReviewerRole::parse(&row.role).ok_or_else(|| PersistenceError::CorruptRow {
            message: format!("unknown reviewer role {:?}", row.role),
        })?;
        let person = PersonId::new(row.person_id);
        match role {
            ReviewerRole::Requested => sets.requested.insert(person),
            ReviewerRole::Removed => sets.removed.insert(person),
            ReviewerRole::Cc => sets.cc.insert(person),
        };
    }
    Ok(sets)
}

const THREAD_COLUMNS: &str = "id, external_id, title, description, status, branch, is_draft, \
     current_commit_hash, author_id, submitter_id, created_at, updated_at, submitted_at, \
     closed_at";

const REVISION_COLUMNS: &str = "id, thread_id, external_id, number, commit_hash, description, \
     author_id, submitter_id, created_at, updated_at, submitted_at";

const COMMENT_COLUMNS: &str = "id, thread_id, external_id, revision_id, file_path, line, \
     author_id, message, in_reply_to_id, created_at, updated_at";

fn insert_thread_row(
    connection: &mut SqliteConnection,
    thread: &ReviewThread,
) -> Result<i64, diesel::result::Error> {
    sql_query(
        "INSERT INTO review_thread \
         (external_id, title, description, status, branch, is_draft, current_commit_hash, \
          author_id, submitter_id, created_at, updated_at, submitted_at, closed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);",
    )
    .bind::<Text, _>(&thread.external_id)
    .bind::<Nullable<Text>, _>(thread.title.as_deref())
    .bind::<Nullable<Text>, _>(thread.description.as_deref())
    .bind::<Text, _>(thread.status.as_str())
    .bind::<Nullable<Text>, _>(thread.branch.as_deref())
    .bind::<Bool, _>(thread.is_draft)
    .bind::<Nullable<Text>, _>(thread.current_commit_hash.as_deref())
    .bind::<Nullable<BigInt>, _>(thread.author_id.map(PersonId::get))
    .bind::<Nullable<BigInt>, _>(thread.submitter_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(thread.created_at))
    .bind::<Text, _>(format_timestamp(thread.updated_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(thread.submitted_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(thread.closed_at))
    .execute(connection)?;

    last_insert_rowid(connection)
}

fn update_thread_row(
    connection: &mut SqliteConnection,
    row_id: i64,
    thread: &ReviewThread,
) -> Result<usize, diesel::result::Error> {
    sql_query(
        "UPDATE review_thread SET \
           title = ?, description = ?, status = ?, branch = ?, is_draft = ?, \
           current_commit_hash = ?, author_id = ?, submitter_id = ?, created_at = ?, \
           updated_at = ?, submitted_at = ?, closed_at = ? \
         WHERE id = ?;",
    )
    .bind::<Nullable<Text>, _>(thread.title.as_deref())
    .bind::<Nullable<Text>, _>(thread.description.as_deref())
    .bind::<Text, _>(thread.status.as_str())
    .bind::<Nullable<Text>, _>(thread.branch.as_deref())
    .bind::<Bool, _>(thread.is_draft)
    .bind::<Nullable<Text>, _>(thread.current_commit_hash.as_deref())
    .bind::<Nullable<BigInt>, _>(thread.author_id.map(PersonId::get))
    .bind::<Nullable<BigInt>, _>(thread.submitter_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(thread.created_at))
    .bind::<Text, _>(format_timestamp(thread.updated_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(thread.submitted_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(thread.closed_at))
    .bind::<BigInt, _>(row_id)
    .execute(connection)
}

fn replace_issue_links(
    connection: &mut SqliteConnection,
    thread_row_id: i64,
    issue_ids: &[IssueId],
) -> Result<(), diesel::result::Error> {
    sql_query("DELETE FROM thread_issue_link WHERE thread_id = ?;")
        .bind::<BigInt, _>(thread_row_id)
        .execute(connection)?;

    for issue_id in issue_ids {
        sql_query("INSERT INTO thread_issue_link (thread_id, issue_id) VALUES (?, ?);")
            .bind::<BigInt, _>(thread_row_id)
            .bind::<BigInt, _>(issue_id.get())
            .execute(connection)?;
    }
    Ok(())
}

fn insert_revision_row(
    connection: &mut SqliteConnection,
    revision: &Revision,
) -> Result<i64, diesel::result::Error> {
    sql_query(
        "INSERT INTO revision \
         (thread_id, external_id, number, commit_hash, description, author_id, submitter_id, \
          created_at, updated_at, submitted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?);",
    )
    .bind::<BigInt, _>(revision.thread_id.get())
    .bind::<Text, _>(&revision.external_id)
    .bind::<BigInt, _>(revision.number)
    .bind::<Nullable<Text>, _>(revision.commit_hash.as_deref())
    .bind::<Nullable<Text>, _>(revision.description.as_deref())
    .bind::<Nullable<BigInt>, _>(revision.author_id.map(PersonId::get))
    .bind::<Nullable<BigInt>, _>(revision.submitter_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(revision.created_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(revision.updated_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(revision.submitted_at))
    .execute(connection)?;

    last_insert_rowid(connection)
}

fn update_revision_row(
    connection: &mut SqliteConnection,
    row_id: i64,
    revision: &Revision,
) -> Result<usize, diesel::result::Error> {
    sql_query(
        "UPDATE revision SET \
           number = ?, commit_hash = ?, description = ?, author_id = ?, submitter_id = ?, \
           created_at = ?, updated_at = ?, submitted_at = ? \
         WHERE id = ?;",
    )
    .bind::<BigInt, _>(revision.number)
    .bind::<Nullable<Text>, _>(revision.commit_hash.as_deref())
    .bind::<Nullable<Text>, _>(revision.description.as_deref())
    .bind::<Nullable<BigInt>, _>(revision.author_id.map(PersonId::get))
    .bind::<Nullable<BigInt>, _>(revision.submitter_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(revision.created_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(revision.updated_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(revision.submitted_at))
    .bind::<BigInt, _>(row_id)
    .execute(connection)
}

fn replace_reviewer_rows(
    connection: &mut SqliteConnection,
    revision_row_id: i64,
    reviewers: &ReviewerSets,
) -> Result<(), diesel::result::Error> {
    sql_query("DELETE FROM revision_reviewer WHERE revision_id = ?;")
        .bind::<BigInt, _>(revision_row_id)
        .execute(connection)?;

    for (role, person) in reviewers.memberships() {
        sql_query("INSERT INTO revision_reviewer (revision_id, person_id, role) VALUES (?, ?, ?);")
            .bind::<BigInt, _>(revision_row_id)
            .bind::<BigInt, _>(person.get())
            .bind::<Text, _>(role.as_str())
            .execute(connection)?;
    }
    Ok(())
}

fn insert_change_log_row(
    connection: &mut SqliteConnection,
    entry: &ChangeLogEntry,
) -> Result<i64, diesel::result::Error> {
    sql_query(
        "INSERT INTO change_log_entry \
         (thread_id, external_id, revision_id, author_id, message, created_at) \
         VALUES (?, ?, ?, ?, ?, ?);",
    )
    .bind::<BigInt, _>(entry.thread_id.get())
    .bind::<Text, _>(&entry.external_id)
    .bind::<Nullable<BigInt>, _>(entry.revision_id.map(RevisionId::get))
    .bind::<Nullable<BigInt>, _>(entry.author_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(entry.message.as_deref())
    .bind::<Nullable<Text>, _>(format_optional_timestamp(entry.created_at))
    .execute(connection)?;

    last_insert_rowid(connection)
}

fn update_change_log_row(
    connection: &mut SqliteConnection,
    row_id: i64,
    entry: &ChangeLogEntry,
) -> Result<usize, diesel::result::Error> {
    sql_query(
        "UPDATE change_log_entry SET \
           revision_id = ?, author_id = ?, message = ?, created_at = ? \
         WHERE id = ?;",
    )
    .bind::<Nullable<BigInt>, _>(entry.revision_id.map(RevisionId::get))
    .bind::<Nullable<BigInt>, _>(entry.author_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(entry.message.as_deref())
    .bind::<Nullable<Text>, _>(format_optional_timestamp(entry.created_at))
    .bind::<BigInt, _>(row_id)
    .execute(connection)
}

fn insert_comment_row(
    connection: &mut SqliteConnection,
    comment: &ReviewComment,
) -> Result<i64, diesel::result::Error> {
    sql_query(
        "INSERT INTO review_comment \
         (thread_id, external_id, revision_id, file_path, line, author_id, message, \
          in_reply_to_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?);",
    )
    .bind::<BigInt, _>(comment.thread_id.get())
    .bind::<Text, _>(&comment.external_id)
    .bind::<Nullable<BigInt>, _>(comment.revision_id.map(RevisionId::get))
    .bind::<Nullable<Text>, _>(comment.file_path.as_deref())
    .bind::<Nullable<BigInt>, _>(comment.line)
    .bind::<Nullable<BigInt>, _>(comment.author_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(comment.message.as_deref())
    .bind::<Nullable<BigInt>, _>(comment.in_reply_to_id.map(CommentId::get))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(comment.created_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(comment.updated_at))
    .execute(connection)?;

    last_insert_rowid(connection)
}

fn update_comment_row(
    connection: &mut SqliteConnection,
    row_id: i64,
    comment: &ReviewComment,
) -> Result<usize, diesel::result::Error> {
    sql_query(
        "UPDATE review_comment SET \
           revision_id = ?, file_path = ?, line = ?, author_id = ?, message = ?, \
           in_reply_to_id = ?, created_at = ?, updated_at = ? \
         WHERE id = ?;",
    )
    .bind::<Nullable<BigInt>, _>(comment.revision_id.map(RevisionId::get))
    .bind::<Nullable<Text>, _>(comment.file_path.as_deref())
    .bind::<Nullable<BigInt>, _>(comment.line)
    .bind::<Nullable<BigInt>, _>(comment.author_id.map(PersonId::get))
    .bind::<Nullable<Text>, _>(comment.message.as_deref())
    .bind::<Nullable<BigInt>, _>(comment.in_reply_to_id.map(CommentId::get))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(comment.created_at))
    .bind::<Nullable<Text>, _>(format_optional_timestamp(comment.updated_at))
    .bind::<BigInt, _>(row_id)
    .execute(connection)
}

impl ReviewStore for SqliteStore {
    fn find_person_by_email(
        &self,
        email: &str,
        name: &str,
    ) -> Result<Option<Person>, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result: Result<Option<PersonRow>, _> = sql_query(
            "SELECT id, name, email, username FROM person WHERE email = ? AND name = ? LIMIT 1;",
        )
        .bind::<Text, _>(email)
        .bind::<Text, _>(name)
        .get_result(&mut connection)
        .optional();

        match result {
            Ok(row) => Ok(row.map(Person::from)),
            Err(error) => Err(Self::map_query_error(&mut connection, &error)),
        }
    }

    fn find_person_by_username(
        &self,
        username: &str,
        name: &str,
    ) -> Result<Option<Person>, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result: Result<Option<PersonRow>, _> = sql_query(
            "SELECT id, name, email, username FROM person WHERE username = ? AND name = ? \
             LIMIT 1;",
        )
        .bind::<Text, _>(username)
        .bind::<Text, _>(name)
        .get_result(&mut connection)
        .optional();

        match result {
            Ok(row) => Ok(row.map(Person::from)),
            Err(error) => Err(Self::map_query_error(&mut connection, &error)),
        }
    }

    fn insert_person(
        &self,
        name: &str,
        email: &str,
        username: &str,
    ) -> Result<Person, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let insert_result = sql_query("INSERT INTO person (name, email, username) VALUES (?, ?, ?);")
            .bind::<Text, _>(name)
            .bind::<Text, _>(email)
            .bind::<Text, _>(username)
            .execute(&mut connection);
        let result = match insert_result {
            Ok(_) => last_insert_rowid(&mut connection),
            Err(error) => Err(error),
        };

        match result {
            Ok(row_id) => Ok(Person {
                id: PersonId::new(row_id),
                name: name.to_owned(),
                email: email.to_owned(),
                username: username.to_owned(),
            }),
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }

    fn find_thread(&self, external_id: &str) -> Result<Option<ReviewThread>, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result: Result<Option<ThreadRow>, _> = sql_query(format!(
            "SELECT {THREAD_COLUMNS} FROM review_thread WHERE external_id = ? LIMIT 1;"
        ))
        .bind::<Text, _>(external_id)
        .get_result(&mut connection)
        .optional();

        let row = match result {
            Ok(None) => return Ok(None),
            Ok(Some(row)) => row,
            Err(error) => return Err(Self::map_query_error(&mut connection, &error)),
        };

        let link_result: Result<Vec<IssueLinkRow>, _> = sql_query(
            "SELECT issue_id FROM thread_issue_link WHERE thread_id = ? ORDER BY issue_id;",
        )
        .bind::<BigInt, _>(row.id)
        .load(&mut connection);
        let links = match link_result {
            Ok(rows) => rows,
            Err(error) => return Err(Self::map_query_error(&mut connection, &error)),
        };

        let linked_issue_ids = links
            .into_iter()
            .map(|link| IssueId::new(link.issue_id))
            .collect();
        row.into_thread(linked_issue_ids).map(Some)
    }

    fn save_thread(&self, thread: &mut ReviewThread) -> Result<ThreadId, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result = connection.transaction::<i64, diesel::result::Error, _>(|conn| {
            let row_id = match thread.id {
                Some(id) => {
                    update_thread_row(conn, id.get(), thread)?;
                    id.get()
                }
                None => insert_thread_row(conn, thread)?,
            };
            replace_issue_links(conn, row_id, &thread.linked_issue_ids)?;
            Ok(row_id)
        });

        match result {
            Ok(row_id) => {
                let id = ThreadId::new(row_id);
                thread.id = Some(id);
                Ok(id)
            }
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }

    fn find_revision(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<Revision>, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result: Result<Option<RevisionRow>, _> = sql_query(format!(
            "SELECT {REVISION_COLUMNS} FROM revision WHERE thread_id = ? AND external_id = ? \
             LIMIT 1;"
        ))
        .bind::<BigInt, _>(thread_id.get())
        .bind::<Text, _>(external_id)
        .get_result(&mut connection)
        .optional();

        load_revision_with_reviewers(&mut connection, result)
    }

    fn find_revision_by_number(
        &self,
        thread_id: ThreadId,
        number: i64,
    ) -> Result<Option<Revision>, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result: Result<Option<RevisionRow>, _> = sql_query(format!(
            "SELECT {REVISION_COLUMNS} FROM revision WHERE thread_id = ? AND number = ? LIMIT 1;"
        ))
        .bind::<BigInt, _>(thread_id.get())
        .bind::<BigInt, _>(number)
        .get_result(&mut connection)
        .optional();

        load_revision_with_reviewers(&mut connection, result)
    }

    fn save_revision(&self, revision: &mut Revision) -> Result<RevisionId, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result = connection.transaction::<i64, diesel::result::Error, _>(|conn| {
            let row_id = match revision.id {
                Some(id) => {
                    update_revision_row(conn, id.get(), revision)?;
                    id.get()
                }
                None => insert_revision_row(conn, revision)?,
            };
            replace_reviewer_rows(conn, row_id, &revision.reviewers)?;
            Ok(row_id)
        });

        match result {
            Ok(row_id) => {
                let id = RevisionId::new(row_id);
                revision.id = Some(id);
                Ok(id)
            }
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }

    fn find_change_log(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<ChangeLogEntry>, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result: Result<Option<ChangeLogRow>, _> = sql_query(
            "SELECT id, thread_id, external_id, revision_id, author_id, message, created_at \
             FROM change_log_entry WHERE thread_id = ? AND external_id = ? LIMIT 1;",
        )
        .bind::<BigInt, _>(thread_id.get())
        .bind::<Text, _>(external_id)
        .get_result(&mut connection)
        .optional();

        match result {
            Ok(None) => Ok(None),
            Ok(Some(row)) => row.into_entry().map(Some),
            Err(error) => Err(Self::map_query_error(&mut connection, &error)),
        }
    }

    fn save_change_log(&self, entry: &mut ChangeLogEntry) -> Result<ChangeLogId, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result = match entry.id {
            Some(id) => update_change_log_row(&mut connection, id.get(), entry).map(|_| id.get()),
            None => insert_change_log_row(&mut connection, entry),
        };

        match result {
            Ok(row_id) => {
                let id = ChangeLogId::new(row_id);
                entry.id = Some(id);
                Ok(id)
            }
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }

    fn insert_change_logs(
        &self,
        entries: &mut [ChangeLogEntry],
    ) -> Result<(), PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result = connection.transaction::<(), diesel::result::Error, _>(|conn| {
            for entry in entries.iter_mut() {
                let row_id = insert_change_log_row(conn, entry)?;
                entry.id = Some(ChangeLogId::new(row_id));
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }

    fn find_comment(
        &self,
        thread_id: ThreadId,
        external_id: &str,
    ) -> Result<Option<ReviewComment>, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result: Result<Option<CommentRow>, _> = sql_query(format!(
            "SELECT {COMMENT_COLUMNS} FROM review_comment WHERE thread_id = ? AND \
             external_id = ? LIMIT 1;"
        ))
        .bind::<BigInt, _>(thread_id.get())
        .bind::<Text, _>(external_id)
        .get_result(&mut connection)
        .optional();

        match result {
            Ok(None) => Ok(None),
            Ok(Some(row)) => row.into_comment().map(Some),
            Err(error) => Err(Self::map_query_error(&mut connection, &error)),
        }
    }

    fn save_comment(&self, comment: &mut ReviewComment) -> Result<CommentId, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result = match comment.id {
            Some(id) => update_comment_row(&mut connection, id.get(), comment).map(|_| id.get()),
            None => insert_comment_row(&mut connection, comment),
        };

        match result {
            Ok(row_id) => {
                let id = CommentId::new(row_id);
                comment.id = Some(id);
                Ok(id)
            }
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }

    fn insert_comments(&self, comments: &mut [ReviewComment]) -> Result<(), PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result = connection.transaction::<(), diesel::result::Error, _>(|conn| {
            for comment in comments.iter_mut() {
                let row_id = insert_comment_row(conn, comment)?;
                comment.id = Some(CommentId::new(row_id));
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }

    fn find_issue(&self, external_id: &str) -> Result<Option<Issue>, PersistenceError> {
        #[derive(Debug, QueryableByName)]
        struct IssueRow {
            #[diesel(sql_type = BigInt)]
            id: i64,
            #[diesel(sql_type = Text)]
            external_id: String,
            #[diesel(sql_type = Nullable<Text>)]
            title: Option<String>,
        }

        let mut connection = self.establish_connection()?;
        let result: Result<Option<IssueRow>, _> =
            sql_query("SELECT id, external_id, title FROM issue WHERE external_id = ? LIMIT 1;")
                .bind::<Text, _>(external_id)
                .get_result(&mut connection)
                .optional();

        match result {
            Ok(row) => Ok(row.map(|issue| Issue {
                id: IssueId::new(issue.id),
                external_id: issue.external_id,
                title: issue.title,
            })),
            Err(error) => Err(Self::map_query_error(&mut connection, &error)),
        }
    }

    fn watermark(&self, source: &str) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        #[derive(Debug, QueryableByName)]
        struct WatermarkRow {
            #[diesel(sql_type = Text)]
            last_updated_at: String,
        }

        let mut connection = self.establish_connection()?;
        let result: Result<Option<WatermarkRow>, _> =
            sql_query("SELECT last_updated_at FROM watermark WHERE source = ? LIMIT 1;")
                .bind::<Text, _>(source)
                .get_result(&mut connection)
                .optional();

        match result {
            Ok(None) => Ok(None),
            Ok(Some(row)) => parse_timestamp(&row.last_updated_at, "last_updated_at").map(Some),
            Err(error) => Err(Self::map_query_error(&mut connection, &error)),
        }
    }

    fn advance_watermark(
        &self,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut connection = self.establish_connection()?;
        let result = sql_query(
            "INSERT INTO watermark (source, last_updated_at) VALUES (?, ?) \
             ON CONFLICT(source) DO UPDATE SET last_updated_at = excluded.last_updated_at;",
        )
        .bind::<Text, _>(source)
        .bind::<Text, _>(format_timestamp(updated_at))
        .execute(&mut connection);

        match result {
            Ok(_) => Ok(()),
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl SqliteStore {
    /// Seeds an issue record, standing in for the sibling issue mirror.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    pub fn seed_issue(&self, external_id: &str, title: &str) -> Result<Issue, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let insert_result = sql_query("INSERT INTO issue (external_id, title) VALUES (?, ?);")
            .bind::<Text, _>(external_id)
            .bind::<Nullable<Text>, _>(Some(title))
            .execute(&mut connection);
        let result = match insert_result {
            Ok(_) => last_insert_rowid(&mut connection),
            Err(error) => Err(error),
        };

        match result {
            Ok(row_id) => Ok(Issue {
                id: IssueId::new(row_id),
                external_id: external_id.to_owned(),
                title: Some(title.to_owned()),
            }),
            Err(error) => Err(Self::map_write_error(&mut connection, &error)),
        }
    }
}

#[derive(Debug, QueryableByName)]
struct IssueLinkRow {
    #[diesel(sql_type = BigInt)]
    issue_id: i64,
}

fn load_revision_with_reviewers(
    connection: &mut SqliteConnection,
    result: Result<Option<RevisionRow>, diesel::result::Error>,
) -> Result<Option<Revision>, PersistenceError> {
    let row = match result {
        Ok(None) => return Ok(None),
        Ok(Some(row)) => row,
        Err(error) => return Err(SqliteStore::map_query_error(connection, &error)),
    };

    let reviewer_result: Result<Vec<ReviewerRow>, _> =
        sql_query("SELECT person_id, role FROM revision_reviewer WHERE revision_id = ?;")
            .bind::<BigInt, _>(row.id)
            .load(&mut *connection);
    let reviewer_rows = match reviewer_result {
        Ok(rows) => rows,
        Err(error) => return Err(SqliteStore::map_query_error(connection, &error)),
    };

    let reviewers = reviewer_sets_from_rows(reviewer_rows)?;
    row.into_revision(reviewers).map(Some)
}
