//! Schema type definitions
//!
//! Supported field types:
//! - string: UTF-8 string
//! - number: any numeric representation, integer or floating
//! - boolean: Boolean
//! - date: an instant, or an RFC3339 textual timestamp
//! - object: nested key-value mapping
//! - array: ordered sequence
//!
//! A table schema is created at version 1 and only ever evolves by
//! additive merge: fields accumulate across versions and are never
//! removed. Each field records the schema version that introduced it
//! (`addedInVersion`), which is what makes lazy read-time defaulting of
//! old records possible.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Value;

/// Supported field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// Integer or floating point
    Number,
    /// Boolean
    Boolean,
    /// Instant value or RFC3339 timestamp string
    Date,
    /// Nested key-value mapping
    Object,
    /// Ordered sequence of values
    Array,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// A single field in a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Field name, unique within the schema
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Inserted at read/write time when the field is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema version that introduced this field; 0 means unset and is
    /// backfilled when the schema is persisted
    #[serde(default)]
    pub added_in_version: u32,
}

impl FieldDefinition {
    /// Create a field with the given name and type
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default_value: None,
            description: None,
            added_in_version: 0,
        }
    }

    /// Attach a default value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Structure and constraints of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Table name; stamped by the store on create
    #[serde(default)]
    pub table_name: String,
    /// Ordered field definitions
    pub fields: Vec<FieldDefinition>,
    /// Fields whose values must not repeat across the table
    #[serde(default)]
    pub unique_fields: Vec<String>,
    /// Fields that must be present on every record
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Monotonically increasing, starting at 1; 0 means unset
    #[serde(default)]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TableSchema {
    /// Create a schema from field definitions; constraints and version
    /// metadata are filled in via the builder methods and the store.
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self {
            table_name: String::new(),
            fields,
            unique_fields: Vec::new(),
            required_fields: Vec::new(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Declare unique fields
    pub fn with_unique_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_fields = names.into_iter().map(Into::into).collect();
        self
    }

    /// Declare required fields
    pub fn with_required_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = names.into_iter().map(Into::into).collect();
        self
    }

    /// Look up a field definition by name
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Stamp a schema for initial persistence: table name, timestamps,
    /// version 1 (unless the caller set one), and `addedInVersion`
    /// backfill for every unset field.
    pub fn finalize_create(mut self, table: &str, now: DateTime<Utc>) -> Self {
        self.table_name = table.to_string();
        self.created_at = now;
        self.updated_at = now;
        if self.version == 0 {
            self.version = 1;
        }
        for field in &mut self.fields {
            if field.added_in_version == 0 {
                field.added_in_version = self.version;
            }
        }
        self
    }

    /// Merge this schema into `old` per the additive evolution rules:
    /// union of fields with the new definition winning, version bumped by
    /// one, creation timestamp preserved, and every field name absent
    /// from `old` stamped with the new version.
    pub fn finalize_update(mut self, old: &TableSchema, now: DateTime<Utc>) -> Self {
        let merged = merge_fields(&old.fields, &self.fields);
        let old_names: HashSet<&str> = old.fields.iter().map(|f| f.name.as_str()).collect();

        self.version = old.version + 1;
        self.table_name = old.table_name.clone();
        self.created_at = old.created_at;
        self.updated_at = now;
        self.fields = merged;
        for field in &mut self.fields {
            if !old_names.contains(field.name.as_str()) {
                field.added_in_version = self.version;
            }
        }
        self
    }
}

/// Union of `old` and `new` by field name: when both sides define the
/// same name the new definition wins; fields present only in `old` are
/// retained unchanged. Result order is not semantically significant (it
/// is sorted by name for deterministic output).
pub fn merge_fields(old: &[FieldDefinition], new: &[FieldDefinition]) -> Vec<FieldDefinition> {
    let mut merged: BTreeMap<&str, &FieldDefinition> = BTreeMap::new();
    for field in old {
        merged.insert(field.name.as_str(), field);
    }
    for field in new {
        merged.insert(field.name.as_str(), field);
    }
    merged.into_values().cloned().collect()
}
