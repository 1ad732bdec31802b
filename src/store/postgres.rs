//! # Relational Backend
//!
//! One physical table per logical table: a caller-supplied id primary
//! key, a JSONB payload column, and creation/update timestamp columns. A
//! dedicated `__table_schemas` metadata table stores each serialized
//! schema keyed by table name, upserted on create and update.
//!
//! Filtering and uniqueness lookups compare the textual projection of a
//! payload key (`data->>'key'`) against the filter value's textual form,
//! so all comparisons degrade to string equality regardless of the
//! field's declared type.
//!
//! No in-process locking: concurrency bounds belong to the connection
//! pool. The check-then-write uniqueness pattern leaves a race window
//! between two concurrent writers with the same unique value; both may
//! pass the check and both will be persisted. This asymmetry with the
//! file backend is a documented limitation, kept for parity with the
//! file backend's single uniqueness algorithm.
//!
//! Logical table names are interpolated into DDL and queries unquoted,
//! like record ids in the file backend: callers must supply trusted
//! names.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use postgres::types::ToSql;
use postgres::NoTls;
use r2d2_postgres::PostgresConnectionManager;
use tracing::{debug, warn};

use crate::config::{PostgresConfig, SslMode};
use crate::error::{StoreError, StoreResult, ValidationDetails};
use crate::record::{Record, Value};
use crate::schema::{apply_defaults, validate, TableSchema};
use crate::store::RecordStore;

const SCHEMA_TABLE: &str = "__table_schemas";

type Pool = r2d2::Pool<PostgresConnectionManager<NoTls>>;
type Connection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

/// PostgreSQL record store
pub struct PostgresStore {
    pool: Pool,
    closed: AtomicBool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize the schema-metadata table.
    /// Connect or init failure aborts store creation.
    pub fn connect(config: &PostgresConfig) -> StoreResult<Self> {
        let mut pg = postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password)
            .ssl_mode(match config.ssl_mode {
                SslMode::Disable => postgres::config::SslMode::Disable,
                SslMode::Prefer => postgres::config::SslMode::Prefer,
                SslMode::Require => postgres::config::SslMode::Require,
            });

        let manager = PostgresConnectionManager::new(pg, NoTls);
        let pool = r2d2::Pool::builder()
            .build(manager)
            .map_err(|e| StoreError::connection("failed to connect to PostgreSQL", e))?;

        let store = Self {
            pool,
            closed: AtomicBool::new(false),
        };
        store.init_schema_table()?;
        debug!(host = %config.host, database = %config.database, "opened postgres store");
        Ok(store)
    }

    fn conn(&self) -> StoreResult<Connection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed());
        }
        self.pool
            .get()
            .map_err(|e| StoreError::connection("failed to acquire connection", e))
    }

    fn init_schema_table(&self) -> StoreResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA_TABLE} (
                table_name VARCHAR(255) PRIMARY KEY,
                schema_data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        );
        self.conn()?
            .execute(ddl.as_str(), &[])
            .map_err(|e| StoreError::io("failed to create schema-metadata table", e))?;
        Ok(())
    }

    fn load_schema(&self, table: &str) -> StoreResult<TableSchema> {
        let row = self
            .conn()?
            .query_opt(
                format!("SELECT schema_data FROM {SCHEMA_TABLE} WHERE table_name = $1").as_str(),
                &[&table],
            )
            .map_err(|e| StoreError::io("failed to load schema", e))?
            .ok_or_else(|| StoreError::not_found(format!("table does not exist: {table}")))?;

        let blob: serde_json::Value = row
            .try_get(0)
            .map_err(|e| StoreError::io("failed to read schema blob", e))?;
        serde_json::from_value(blob).map_err(|e| StoreError::io("failed to decode schema", e))
    }

    fn save_schema(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        let blob = serde_json::to_value(schema)
            .map_err(|e| StoreError::io("failed to encode schema", e))?;
        let now = Utc::now();
        self.conn()?
            .execute(
                format!(
                    "INSERT INTO {SCHEMA_TABLE} (table_name, schema_data, created_at, updated_at)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (table_name)
                     DO UPDATE SET schema_data = $2, updated_at = $4"
                )
                .as_str(),
                &[&table, &blob, &now, &now],
            )
            .map_err(|e| StoreError::io("failed to save schema", e))?;
        Ok(())
    }

    /// Point lookup per unique field: reject when any other row holds the
    /// same textual value. Executed before the write, not enforced by a
    /// native constraint.
    fn check_unique(
        &self,
        table: &str,
        data: &Record,
        unique_fields: &[String],
        exclude_id: Option<&str>,
    ) -> StoreResult<()> {
        for field in unique_fields {
            let Some(value) = data.get(field) else {
                continue;
            };
            let text = value.to_text();
            let rows = self
                .conn()?
                .query(
                    format!("SELECT id FROM {table} WHERE data->>'{field}' = $1").as_str(),
                    &[&text],
                )
                .map_err(|e| StoreError::io("failed to check unique constraint", e))?;

            for row in rows {
                let existing_id: String = row
                    .try_get(0)
                    .map_err(|e| StoreError::io("failed to read row id", e))?;
                if exclude_id != Some(existing_id.as_str()) {
                    return Err(StoreError::validation(ValidationDetails::duplicate_value(
                        field.as_str(),
                        text,
                    )));
                }
            }
        }
        Ok(())
    }

    fn decode_row(row: &postgres::Row) -> StoreResult<Record> {
        let payload: serde_json::Value = row
            .try_get(0)
            .map_err(|e| StoreError::io("failed to read record payload", e))?;
        serde_json::from_value(payload).map_err(|e| StoreError::io("failed to decode record", e))
    }
}

impl RecordStore for PostgresStore {
    fn create_table(&self, table: &str, schema: TableSchema) -> StoreResult<()> {
        if self.table_exists(table)? {
            return Err(StoreError::already_exists(format!(
                "table already exists: {table}"
            )));
        }

        let ddl = format!(
            "CREATE TABLE {table} (
                id VARCHAR(255) PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        );
        self.conn()?
            .execute(ddl.as_str(), &[])
            .map_err(|e| StoreError::io("failed to create table", e))?;

        debug!(table, "created table");
        self.save_schema(table, &schema.finalize_create(table, Utc::now()))
    }

    fn drop_table(&self, table: &str) -> StoreResult<()> {
        // NotFound for an absent table, same as the file backend
        self.load_schema(table)?;

        self.conn()?
            .execute(
                format!("DELETE FROM {SCHEMA_TABLE} WHERE table_name = $1").as_str(),
                &[&table],
            )
            .map_err(|e| StoreError::io("failed to delete schema metadata", e))?;
        self.conn()?
            .execute(format!("DROP TABLE IF EXISTS {table}").as_str(), &[])
            .map_err(|e| StoreError::io("failed to drop table", e))?;
        debug!(table, "dropped table");
        Ok(())
    }

    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let row = self
            .conn()?
            .query_one(
                "SELECT EXISTS (
                    SELECT FROM information_schema.tables WHERE table_name = $1
                )",
                &[&table],
            )
            .map_err(|e| StoreError::io("failed to check table existence", e))?;
        row.try_get(0)
            .map_err(|e| StoreError::io("failed to read existence flag", e))
    }

    fn get_table_schema(&self, table: &str) -> StoreResult<TableSchema> {
        self.load_schema(table)
    }

    fn update_table_schema(&self, table: &str, schema: TableSchema) -> StoreResult<()> {
        let old = self.load_schema(table)?;
        let merged = schema.finalize_update(&old, Utc::now());
        debug!(table, version = merged.version, "updated table schema");
        self.save_schema(table, &merged)
    }

    fn insert(&self, table: &str, mut data: Record) -> StoreResult<String> {
        let schema = self.load_schema(table)?;

        // Caller-supplied keys are required in relational mode
        let id = match data.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(StoreError::validation(ValidationDetails::missing_id())),
        };

        apply_defaults(&mut data, &schema);
        validate(&data, &schema)?;
        self.check_unique(table, &data, &schema.unique_fields, None)?;

        let now = Utc::now();
        data.entry("createdAt".into()).or_insert(Value::Date(now));
        data.insert("updatedAt".into(), Value::Date(now));

        let payload = serde_json::to_value(&data)
            .map_err(|e| StoreError::io("failed to encode record", e))?;
        self.conn()?
            .execute(
                format!(
                    "INSERT INTO {table} (id, data, created_at, updated_at)
                     VALUES ($1, $2, $3, $4)"
                )
                .as_str(),
                &[&id, &payload, &now, &now],
            )
            .map_err(|e| StoreError::io("failed to insert record", e))?;

        debug!(table, id = %id, "inserted record");
        Ok(id)
    }

    fn get(&self, table: &str, id: &str) -> StoreResult<Record> {
        let schema = self.load_schema(table)?;

        let row = self
            .conn()?
            .query_opt(format!("SELECT data FROM {table} WHERE id = $1").as_str(), &[&id])
            .map_err(|e| StoreError::io("failed to query record", e))?
            .ok_or_else(|| StoreError::not_found(format!("record not found: {id}")))?;

        let mut record = Self::decode_row(&row)?;
        apply_defaults(&mut record, &schema);
        Ok(record)
    }

    fn update(&self, table: &str, id: &str, data: Record) -> StoreResult<()> {
        let schema = self.load_schema(table)?;
        let mut existing = self.get(table, id)?;

        // Shallow merge: each key in `data` replaces the stored value
        for (key, value) in data {
            existing.insert(key, value);
        }
        existing.insert("id".into(), Value::String(id.to_string()));
        let now = Utc::now();
        existing.insert("updatedAt".into(), Value::Date(now));

        apply_defaults(&mut existing, &schema);
        validate(&existing, &schema)?;
        self.check_unique(table, &existing, &schema.unique_fields, Some(id))?;

        let payload = serde_json::to_value(&existing)
            .map_err(|e| StoreError::io("failed to encode record", e))?;
        let updated = self
            .conn()?
            .execute(
                format!("UPDATE {table} SET data = $1, updated_at = $2 WHERE id = $3").as_str(),
                &[&payload, &now, &id],
            )
            .map_err(|e| StoreError::io("failed to update record", e))?;

        if updated == 0 {
            return Err(StoreError::not_found(format!("record not found: {id}")));
        }
        debug!(table, id, "updated record");
        Ok(())
    }

    fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn()?
            .execute(format!("DELETE FROM {table} WHERE id = $1").as_str(), &[&id])
            .map_err(|e| StoreError::io("failed to delete record", e))?;

        if deleted == 0 {
            return Err(StoreError::not_found(format!("record not found: {id}")));
        }
        debug!(table, id, "deleted record");
        Ok(())
    }

    fn list(&self, table: &str, filter: &Record) -> StoreResult<Vec<Record>> {
        let schema = self.load_schema(table)?;

        let (clause, args) = filter_predicates(filter);
        let query = format!("SELECT data FROM {table}{clause}");
        let params: Vec<&(dyn ToSql + Sync)> =
            args.iter().map(|a| a as &(dyn ToSql + Sync)).collect();

        let rows = self
            .conn()?
            .query(query.as_str(), &params)
            .map_err(|e| StoreError::io("failed to query records", e))?;

        let mut results = Vec::new();
        for row in rows {
            let mut record = match Self::decode_row(&row) {
                Ok(record) => record,
                Err(_) => {
                    // Lossy tolerance: an undecodable row does not fail
                    // the scan
                    warn!(table, "skipping undecodable row");
                    continue;
                }
            };
            apply_defaults(&mut record, &schema);
            results.push(record);
        }
        Ok(results)
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One equality predicate per filter key against the textual projection
/// of that key inside the payload. Returns the WHERE clause (empty for an
/// empty filter) and the positional arguments.
fn filter_predicates(filter: &Record) -> (String, Vec<String>) {
    if filter.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut conditions = Vec::with_capacity(filter.len());
    let mut args = Vec::with_capacity(filter.len());
    for (position, (key, value)) in filter.iter().enumerate() {
        conditions.push(format!("data->>'{key}' = ${}", position + 1));
        args.push(value.to_text());
    }
    (format!(" WHERE {}", conditions.join(" AND ")), args)
}
