//! Error types for local persistence operations.

use thiserror::Error;

/// Errors returned while initialising, migrating, or querying the local
/// `SQLite` database.
///
/// Not-found is deliberately absent: lookups return `Ok(None)` because a
/// missing record is a normal branch of reconciliation, never a fault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// No database URL/path was provided.
    #[error("database URL is required (use --database-url or REVUE_DATABASE_URL)")]
    MissingDatabaseUrl,

    /// The database URL/path was present but blank.
    #[error("database URL must not be blank")]
    BlankDatabaseUrl,

    /// Establishing a `SQLite` connection failed.
    #[error("failed to connect to SQLite database: {message}")]
    ConnectionFailed {
        /// Error detail from Diesel.
        message: String,
    },

    /// Running pending migrations failed.
    #[error("failed to run database migrations: {message}")]
    MigrationFailed {
        /// Error detail from Diesel migrations.
        message: String,
    },

    /// Enabling foreign key enforcement failed.
    #[error("failed to enable foreign keys: {message}")]
    ForeignKeysEnableFailed {
        /// Error detail from the PRAGMA execution.
        message: String,
    },

    /// Reading the schema version from the migration table failed.
    #[error("failed to read schema version after migrations: {message}")]
    SchemaVersionQueryFailed {
        /// Error detail from Diesel query execution.
        message: String,
    },

    /// The migrations completed but no schema version could be found.
    #[error("no schema version recorded after migrations ran")]
    MissingSchemaVersion,

    /// The review schema has not been created yet.
    #[error("review schema is not initialised; run with --migrate-db first")]
    SchemaNotInitialised,

    /// A read query failed.
    #[error("query failed: {message}")]
    QueryFailed {
        /// Error detail from Diesel query execution.
        message: String,
    },

    /// A write failed.
    #[error("write failed: {message}")]
    WriteFailed {
        /// Error detail from Diesel query execution.
        message: String,
    },

    /// A stored row could not be decoded back into a domain value.
    #[error("stored row is corrupt: {message}")]
    CorruptRow {
        /// Description of the undecodable column.
        message: String,
    },
}
