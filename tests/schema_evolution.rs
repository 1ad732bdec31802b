//! Schema Evolution Tests
//!
//! Additive schema evolution and lazy migration:
//! - version strictly increases on every update
//! - omitted fields survive with their original addedInVersion
//! - records written before a field existed pick up its default at read
//!   time; a null default leaves the key absent
//! - the creation timestamp is preserved across updates

use recstore::record::{Record, Value};
use recstore::schema::{FieldDefinition, FieldType, TableSchema};
use recstore::store::{FileStore, RecordStore};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

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

fn add_field(store: &FileStore, field: FieldDefinition) {
    store
        .update_table_schema("customers", TableSchema::new(vec![field]))
        .unwrap();
}

// =============================================================================
// Versioning
// =============================================================================

/// Two successive updates bump the version by exactly one each.
#[test]
fn test_version_increments_by_one_per_update() {
    let (_tmp, store) = setup();

    add_field(&store, FieldDefinition::new("phone", FieldType::String));
    assert_eq!(store.get_table_schema("customers").unwrap().version, 2);

    add_field(&store, FieldDefinition::new("fax", FieldType::String));
    assert_eq!(store.get_table_schema("customers").unwrap().version, 3);
}

/// Fields omitted from the update payload still exist afterwards with
/// their original addedInVersion.
#[test]
fn test_omitted_fields_are_retained() {
    let (_tmp, store) = setup();
    add_field(&store, FieldDefinition::new("phone", FieldType::String));

    let schema = store.get_table_schema("customers").unwrap();
    let email = schema.field("email").unwrap();
    assert_eq!(email.added_in_version, 1);

    let phone = schema.field("phone").unwrap();
    assert_eq!(phone.added_in_version, 2);
}

#[test]
fn test_creation_timestamp_is_preserved() {
    let (_tmp, store) = setup();
    let before = store.get_table_schema("customers").unwrap();

    add_field(&store, FieldDefinition::new("phone", FieldType::String));

    let after = store.get_table_schema("customers").unwrap();
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
}

/// Redefining an existing field keeps the union semantics: the new
/// definition wins, nothing is removed.
#[test]
fn test_redefining_a_field_never_removes_others() {
    let (_tmp, store) = setup();
    add_field(
        &store,
        FieldDefinition::new("email", FieldType::String).with_description("primary contact"),
    );

    let schema = store.get_table_schema("customers").unwrap();
    assert!(schema.field("name").is_some());
    assert_eq!(
        schema.field("email").unwrap().description.as_deref(),
        Some("primary contact")
    );
}

// =============================================================================
// Lazy Migration
// =============================================================================

/// A record written before field F existed reads back with F equal to
/// its non-null default.
#[test]
fn test_old_record_picks_up_new_default_at_read_time() {
    let (_tmp, store) = setup();
    let id = store.insert("customers", customer("a@x.com", "A")).unwrap();

    add_field(
        &store,
        FieldDefinition::new("phone", FieldType::String).with_default(""),
    );

    let record = store.get("customers", &id).unwrap();
    assert_eq!(record.get("phone"), Some(&Value::from("")));
}

/// A null default leaves the key absent.
#[test]
fn test_null_default_leaves_key_absent() {
    let (_tmp, store) = setup();
    let id = store.insert("customers", customer("a@x.com", "A")).unwrap();

    add_field(
        &store,
        FieldDefinition::new("nickname", FieldType::String).with_default(Value::Null),
    );

    let record = store.get("customers", &id).unwrap();
    assert!(!record.contains_key("nickname"));
}

/// Schema changes never rewrite stored records; the upgrade is visible
/// on read only.
#[test]
fn test_stored_file_is_not_rewritten_on_schema_change() {
    let (tmp, store) = setup();
    let mut data = customer("a@x.com", "A");
    data.insert("id".into(), Value::from("cust-001"));
    store.insert("customers", data).unwrap();

    let path = tmp.path().join("customers").join("cust-001.json");
    let on_disk_before = std::fs::read_to_string(&path).unwrap();

    add_field(
        &store,
        FieldDefinition::new("phone", FieldType::String).with_default(""),
    );

    let on_disk_after = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk_before, on_disk_after);
    assert!(!on_disk_after.contains("phone"));
}

/// New inserts validate against the evolved schema.
#[test]
fn test_new_records_validate_against_evolved_schema() {
    let (_tmp, store) = setup();
    add_field(&store, FieldDefinition::new("age", FieldType::Number));

    let mut data = customer("b@x.com", "B");
    data.insert("age".into(), Value::from("forty"));
    let err = store.insert("customers", data).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let mut data = customer("c@x.com", "C");
    data.insert("age".into(), Value::from(40i64));
    store.insert("customers", data).unwrap();
}

// =============================================================================
// End-to-End Scenario
// =============================================================================

/// The full customers scenario: unique rejection, schema evolution, lazy
/// default on read.
#[test]
fn test_customers_scenario() {
    let (_tmp, store) = setup();

    let id1 = store.insert("customers", customer("a@x.com", "A")).unwrap();
    let err = store
        .insert("customers", customer("a@x.com", "B"))
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    add_field(
        &store,
        FieldDefinition::new("phone", FieldType::String).with_default(""),
    );

    let record = store.get("customers", &id1).unwrap();
    assert_eq!(record.get("phone"), Some(&Value::from("")));
}
