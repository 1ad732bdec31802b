//! # File Backend
//!
//! One directory per table under a configured root, one pretty-printed
//! JSON file per record named by its id, and an `index.json` schema file
//! inside each table directory. Scans skip the schema file, non-JSON
//! files and nested directories.
//!
//! A single reader/writer lock guards the entire backend instance, not
//! per-table or per-record: writes take exclusive access, reads share.
//! This serializes all table operations on one instance in exchange for a
//! race-free uniqueness check and schema file.
//!
//! Identifiers are not sanitized against path separators; callers must
//! guarantee ids contain no path-traversal characters.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult, ValidationDetails};
use crate::record::{matches_filter, Record, Value};
use crate::schema::{apply_defaults, validate, TableSchema};
use crate::store::RecordStore;

const SCHEMA_FILE: &str = "index.json";

/// Flat-file record store
#[derive(Debug)]
pub struct FileStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Open a file store rooted at `data_dir`, creating the directory if
    /// it is missing. Failure to create the root aborts store creation.
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_dir = data_dir.into();
        fs::create_dir_all(&base_dir)
            .map_err(|e| StoreError::io("failed to create data directory", e))?;
        debug!(root = %base_dir.display(), "opened file store");
        Ok(Self {
            base_dir,
            lock: RwLock::new(()),
        })
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.base_dir.join(table)
    }

    fn record_path(&self, table: &str, id: &str) -> PathBuf {
        self.table_dir(table).join(format!("{id}.json"))
    }

    fn read_guard(&self) -> StoreResult<RwLockReadGuard<'_, ()>> {
        self.lock
            .read()
            .map_err(|_| StoreError::Internal("store lock poisoned".into()))
    }

    fn write_guard(&self) -> StoreResult<RwLockWriteGuard<'_, ()>> {
        self.lock
            .write()
            .map_err(|_| StoreError::Internal("store lock poisoned".into()))
    }

    fn load_schema(&self, table: &str) -> StoreResult<TableSchema> {
        let path = self.table_dir(table).join(SCHEMA_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::not_found(format!(
                    "table does not exist: {table}"
                )));
            }
            Err(e) => return Err(StoreError::io("failed to read schema", e)),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::io("failed to parse schema", e))
    }

    fn save_schema(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        let path = self.table_dir(table).join(SCHEMA_FILE);
        write_pretty_json(&path, schema)
    }

    fn load_record(&self, path: &Path, id: &str) -> StoreResult<Record> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::not_found(format!("record not found: {id}")));
            }
            Err(e) => return Err(StoreError::io("failed to read record", e)),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::io("failed to parse record", e))
    }

    fn save_record(&self, table: &str, id: &str, record: &Record) -> StoreResult<()> {
        write_pretty_json(&self.record_path(table, id), record)
    }

    /// Iterate the record files of a table, skipping the schema file and
    /// anything that is not a `.json` regular file. Yields (id, path).
    fn record_files(&self, table: &str) -> StoreResult<Vec<(String, PathBuf)>> {
        let dir = self.table_dir(table);
        let entries =
            fs::read_dir(&dir).map_err(|e| StoreError::io("failed to read table directory", e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("failed to read directory entry", e))?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == SCHEMA_FILE {
                continue;
            }
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            files.push((id.to_string(), path));
        }
        Ok(files)
    }

    /// Reject the write when any other record holds the same value for a
    /// unique field. Absent or mismatched values never conflict; the scan
    /// compares raw stored values, without defaults applied.
    fn check_unique(
        &self,
        table: &str,
        data: &Record,
        unique_fields: &[String],
        exclude_id: Option<&str>,
    ) -> StoreResult<()> {
        if unique_fields.is_empty() {
            return Ok(());
        }

        for (id, path) in self.record_files(table)? {
            if exclude_id == Some(id.as_str()) {
                continue;
            }
            let Ok(existing) = self.load_record(&path, &id) else {
                continue;
            };
            for field in unique_fields {
                if let (Some(candidate), Some(stored)) = (data.get(field), existing.get(field)) {
                    if candidate == stored {
                        return Err(StoreError::validation(ValidationDetails::duplicate_value(
                            field.as_str(),
                            candidate.to_text(),
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn create_table(&self, table: &str, schema: TableSchema) -> StoreResult<()> {
        let _guard = self.write_guard()?;

        let dir = self.table_dir(table);
        if dir.exists() {
            return Err(StoreError::already_exists(format!(
                "table already exists: {table}"
            )));
        }
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::io("failed to create table directory", e))?;

        debug!(table, "created table");
        self.save_schema(table, &schema.finalize_create(table, Utc::now()))
    }

    fn drop_table(&self, table: &str) -> StoreResult<()> {
        let _guard = self.write_guard()?;

        let dir = self.table_dir(table);
        if !dir.exists() {
            return Err(StoreError::not_found(format!(
                "table does not exist: {table}"
            )));
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| StoreError::io("failed to remove table directory", e))?;
        debug!(table, "dropped table");
        Ok(())
    }

    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let _guard = self.read_guard()?;
        Ok(self.table_dir(table).exists())
    }

    fn get_table_schema(&self, table: &str) -> StoreResult<TableSchema> {
        let _guard = self.read_guard()?;
        self.load_schema(table)
    }

    fn update_table_schema(&self, table: &str, schema: TableSchema) -> StoreResult<()> {
        let _guard = self.write_guard()?;

        let old = self.load_schema(table)?;
        let merged = schema.finalize_update(&old, Utc::now());
        debug!(table, version = merged.version, "updated table schema");
        self.save_schema(table, &merged)
    }

    fn insert(&self, table: &str, mut data: Record) -> StoreResult<String> {
        let _guard = self.write_guard()?;

        let schema = self.load_schema(table)?;

        let id = match data.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = Uuid::new_v4().to_string();
                data.insert("id".into(), Value::String(id.clone()));
                id
            }
        };

        apply_defaults(&mut data, &schema);
        validate(&data, &schema)?;
        self.check_unique(table, &data, &schema.unique_fields, None)?;

        let now = Utc::now();
        data.entry("createdAt".into()).or_insert(Value::Date(now));
        data.insert("updatedAt".into(), Value::Date(now));

        self.save_record(table, &id, &data)?;
        debug!(table, id = %id, "inserted record");
        Ok(id)
    }

    fn get(&self, table: &str, id: &str) -> StoreResult<Record> {
        let _guard = self.read_guard()?;

        let schema = self.load_schema(table)?;
        let mut record = self.load_record(&self.record_path(table, id), id)?;
        apply_defaults(&mut record, &schema);
        Ok(record)
    }

    fn update(&self, table: &str, id: &str, data: Record) -> StoreResult<()> {
        let _guard = self.write_guard()?;

        let schema = self.load_schema(table)?;
        let mut existing = self.load_record(&self.record_path(table, id), id)?;

        // Shallow merge: each key in `data` replaces the stored value
        for (key, value) in data {
            existing.insert(key, value);
        }
        existing.insert("id".into(), Value::String(id.to_string()));
        existing.insert("updatedAt".into(), Value::Date(Utc::now()));

        apply_defaults(&mut existing, &schema);
        validate(&existing, &schema)?;
        self.check_unique(table, &existing, &schema.unique_fields, Some(id))?;

        self.save_record(table, id, &existing)?;
        debug!(table, id, "updated record");
        Ok(())
    }

    fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        let _guard = self.write_guard()?;

        let path = self.record_path(table, id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(table, id, "deleted record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::not_found(format!("record not found: {id}")))
            }
            Err(e) => Err(StoreError::io("failed to delete record", e)),
        }
    }

    fn list(&self, table: &str, filter: &Record) -> StoreResult<Vec<Record>> {
        let _guard = self.read_guard()?;

        let schema = self.load_schema(table)?;
        let mut results = Vec::new();
        for (id, path) in self.record_files(table)? {
            let mut record = match self.load_record(&path, &id) {
                Ok(record) => record,
                Err(_) => {
                    // Lossy tolerance: an unreadable record does not fail
                    // the scan
                    warn!(table, id = %id, "skipping unreadable record");
                    continue;
                }
            };
            apply_defaults(&mut record, &schema);
            if matches_filter(&record, filter) {
                results.push(record);
            }
        }
        Ok(results)
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn write_pretty_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::io("failed to encode json", e))?;
    fs::write(path, encoded).map_err(|e| StoreError::io("failed to write file", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldType};
    use tempfile::TempDir;

    fn customer_schema() -> TableSchema {
        TableSchema::new(vec![
            FieldDefinition::new("id", FieldType::String),
            FieldDefinition::new("email", FieldType::String),
            FieldDefinition::new("name", FieldType::String),
        ])
        .with_unique_fields(["email"])
        .with_required_fields(["email", "name"])
    }

    fn customer(email: &str, name: &str) -> Record {
        let mut record = Record::new();
        record.insert("email".into(), Value::from(email));
        record.insert("name".into(), Value::from(name));
        record
    }

    fn setup() -> (TempDir, FileStore) {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.create_table("customers", customer_schema()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_create_table_writes_schema_file() {
        let (tmp, _store) = setup();
        assert!(tmp.path().join("customers").join("index.json").exists());
    }

    #[test]
    fn test_create_existing_table_fails() {
        let (_tmp, store) = setup();
        let err = store
            .create_table("customers", customer_schema())
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let (_tmp, store) = setup();
        let id = store.insert("customers", customer("a@x.com", "A")).unwrap();

        let record = store.get("customers", &id).unwrap();
        assert_eq!(record.get("email"), Some(&Value::from("a@x.com")));
        assert!(record.contains_key("createdAt"));
        assert!(record.contains_key("updatedAt"));
    }

    #[test]
    fn test_insert_generates_id_when_absent() {
        let (_tmp, store) = setup();
        let id = store.insert("customers", customer("a@x.com", "A")).unwrap();
        assert!(!id.is_empty());

        let record = store.get("customers", &id).unwrap();
        assert_eq!(record.get("id"), Some(&Value::String(id)));
    }

    #[test]
    fn test_record_file_named_by_id() {
        let (tmp, store) = setup();
        let mut data = customer("a@x.com", "A");
        data.insert("id".into(), Value::from("cust-001"));
        store.insert("customers", data).unwrap();
        assert!(tmp
            .path()
            .join("customers")
            .join("cust-001.json")
            .exists());
    }

    #[test]
    fn test_missing_table_is_not_found() {
        let (_tmp, store) = setup();
        let err = store.get("ghosts", "x").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_unique_scan_skips_schema_file() {
        let (_tmp, store) = setup();
        // index.json must never count as a record during the scan
        store.insert("customers", customer("a@x.com", "A")).unwrap();
        assert_eq!(store.list("customers", &Record::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_list_skips_nested_directories_and_foreign_files() {
        let (tmp, store) = setup();
        store.insert("customers", customer("a@x.com", "A")).unwrap();
        fs::create_dir(tmp.path().join("customers").join("nested")).unwrap();
        fs::write(tmp.path().join("customers").join("notes.txt"), b"x").unwrap();

        assert_eq!(store.list("customers", &Record::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_list_skips_corrupt_record() {
        let (tmp, store) = setup();
        store.insert("customers", customer("a@x.com", "A")).unwrap();
        fs::write(tmp.path().join("customers").join("bad.json"), b"{ not json").unwrap();

        assert_eq!(store.list("customers", &Record::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_tmp, store) = setup();
        store.close().unwrap();
        store.close().unwrap();
    }
}
