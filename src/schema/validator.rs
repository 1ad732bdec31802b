//! Record validation and default application
//!
//! Validation is deterministic and never mutates the record. It checks
//! the schema's required-field set and the declared type of every key the
//! schema knows about; undeclared keys pass untouched so that records
//! written by newer schemas stay readable (forward compatibility).
//! Explicit nulls satisfy any declared type.

use chrono::DateTime;

use crate::error::{StoreError, StoreResult, ValidationDetails};
use crate::record::{Record, Value};
use crate::schema::types::{FieldType, TableSchema};

/// Insert every non-null schema default whose field is absent from the
/// record. A key already present is never overwritten, including keys
/// holding an explicit null.
pub fn apply_defaults(record: &mut Record, schema: &TableSchema) {
    for field in &schema.fields {
        if record.contains_key(&field.name) {
            continue;
        }
        match &field.default_value {
            Some(default) if !default.is_null() => {
                record.insert(field.name.clone(), default.clone());
            }
            _ => {}
        }
    }
}

/// Validate a record against a schema: required fields first, then the
/// declared type of every declared key present in the record.
pub fn validate(record: &Record, schema: &TableSchema) -> StoreResult<()> {
    for name in &schema.required_fields {
        if !record.contains_key(name) {
            return Err(StoreError::validation(ValidationDetails::missing_field(
                name.as_str(),
            )));
        }
    }

    for (key, value) in record {
        let Some(field) = schema.field(key) else {
            // Unknown keys are tolerated for forward compatibility
            continue;
        };
        if !value_matches(value, field.field_type) {
            return Err(StoreError::validation(ValidationDetails::type_mismatch(
                key.as_str(),
                field.field_type.type_name(),
                value.type_name(),
            )));
        }
    }

    Ok(())
}

/// Whether a value satisfies a declared field type. Null satisfies every
/// type; `date` accepts an instant or an RFC3339-parseable string.
fn value_matches(value: &Value, expected: FieldType) -> bool {
    if value.is_null() {
        return true;
    }
    match expected {
        FieldType::String => matches!(value, Value::String(_)),
        FieldType::Number => matches!(value, Value::Number(_)),
        FieldType::Boolean => matches!(value, Value::Bool(_)),
        FieldType::Date => match value {
            Value::Date(_) => true,
            Value::String(text) => DateTime::parse_from_rfc3339(text).is_ok(),
            _ => false,
        },
        FieldType::Object => matches!(value, Value::Object(_)),
        FieldType::Array => matches!(value, Value::Array(_)),
    }
}
