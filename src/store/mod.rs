//! # Record Store Contract
//!
//! The abstract operation set both backends implement identically from
//! the caller's perspective, and the factory that selects a backend from
//! a [`StoreConfig`]. All operations are table-scoped and synchronous:
//! every call blocks the calling thread until I/O completes, and there is
//! no retry logic inside the store -- callers own retry policy.

pub mod file;
pub mod postgres;

pub use file::FileStore;
pub use postgres::PostgresStore;

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::record::Record;
use crate::schema::TableSchema;

/// Table lifecycle and CRUD operations over named tables of
/// dynamically-typed records.
pub trait RecordStore: Send + Sync {
    /// Create a table with the given schema. Fails with `AlreadyExists`
    /// if the table exists. Persists the schema at version 1 and
    /// backfills every field's `addedInVersion`.
    fn create_table(&self, table: &str, schema: TableSchema) -> StoreResult<()>;

    /// Delete a table and all of its storage. Fails with `NotFound` if
    /// the table does not exist.
    fn drop_table(&self, table: &str) -> StoreResult<()>;

    /// Whether a table exists
    fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Load the current schema for a table
    fn get_table_schema(&self, table: &str) -> StoreResult<TableSchema>;

    /// Additively merge a new schema over the current one: version bumped
    /// by one, fields never removed, new field names stamped with the new
    /// version, creation timestamp preserved.
    fn update_table_schema(&self, table: &str, schema: TableSchema) -> StoreResult<()>;

    /// Insert a record after defaulting, validation and uniqueness
    /// checks; returns the record id. The file backend generates an id
    /// when the caller supplies none; the relational backend requires a
    /// caller-supplied id.
    fn insert(&self, table: &str, data: Record) -> StoreResult<String>;

    /// Load a record by id, upgraded with the table's current schema
    /// defaults so callers never observe a missing key for a field
    /// introduced after the record was written.
    fn get(&self, table: &str, id: &str) -> StoreResult<Record>;

    /// Shallow-merge `data` over the stored record (object and array
    /// values are replaced wholesale), then re-default, re-validate and
    /// re-check uniqueness excluding this record's own id.
    fn update(&self, table: &str, id: &str, data: Record) -> StoreResult<()>;

    /// Remove a record. Fails with `NotFound` when the id is absent,
    /// including for an id that was already deleted.
    fn delete(&self, table: &str, id: &str) -> StoreResult<()>;

    /// Full scan with defaults applied per record; a record is kept only
    /// if every filter key is present with an exactly equal value.
    /// Individually unreadable records are skipped, not fatal.
    fn list(&self, table: &str, filter: &Record) -> StoreResult<Vec<Record>>;

    /// Release backend resources. Safe to call once; a no-op thereafter.
    fn close(&self) -> StoreResult<()>;
}

/// Open the backend selected by the configuration.
///
/// Construction failures (root directory creation, connect/ping) are
/// fatal and abort store creation.
pub fn open(config: &StoreConfig) -> StoreResult<Box<dyn RecordStore>> {
    match config {
        StoreConfig::File { data_dir } => Ok(Box::new(FileStore::open(data_dir)?)),
        StoreConfig::Postgres(pg) => Ok(Box::new(PostgresStore::connect(pg)?)),
    }
}
