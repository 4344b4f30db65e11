//! Local persistence and database migrations.
//!
//! Mirrored entities land in a local `SQLite` database whose schema is
//! managed with Diesel migrations. The sync engine only sees the
//! [`ReviewStore`] trait (lookup by natural key, insert-or-update, and
//! batch insert), so tests run against the in-memory implementation.

mod error;
mod migrator;
mod sqlite;
mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use error::PersistenceError;
pub use migrator::{
    CURRENT_SCHEMA_VERSION, INITIAL_SCHEMA_VERSION, SchemaVersion, migrate_database,
};
pub use sqlite::SqliteStore;
pub use store::ReviewStore;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;
