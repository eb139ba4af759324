//! Record type definitions and positional records

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{SchemaError, SchemaResult};
use crate::value::{Value, ValueTag};

static NULL_VALUE: Value = Value::Null;

/// Supported field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 64-bit floating point
    Float,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
        }
    }

    /// Whether values with this tag may be stored in the field
    pub fn accepts(&self, tag: ValueTag) -> bool {
        matches!(
            (self, tag),
            (FieldType::String, ValueTag::String)
                | (FieldType::Int, ValueTag::Int)
                | (FieldType::Bool, ValueTag::Bool)
                | (FieldType::Float, ValueTag::Double)
        )
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Whether field must be present and non-null
    pub required: bool,
}

/// Positional accessor for one field of a registered record type.
///
/// Resolved when the record type is built; reading through it is an index
/// into the record's value vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccessor {
    position: usize,
    name: Arc<str>,
}

impl FieldAccessor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Read the field from a record. Absent values read as `Null`.
    pub fn get<'r>(&self, record: &'r Record) -> &'r Value {
        record.values.get(self.position).unwrap_or(&NULL_VALUE)
    }
}

/// A registered record type.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    fields: Vec<FieldDef>,
    accessors: HashMap<String, FieldAccessor>,
    primary_key: FieldAccessor,
}

impl RecordType {
    /// Start building a record type
    pub fn builder(name: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
            primary_key: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Accessor resolved at registration, if the field exists
    pub fn accessor(&self, field: &str) -> Option<&FieldAccessor> {
        self.accessors.get(field)
    }

    /// Accessor or `UnknownField` error
    pub fn require_accessor(&self, field: &str) -> SchemaResult<&FieldAccessor> {
        self.accessor(field).ok_or_else(|| SchemaError::UnknownField {
            record_type: self.name.clone(),
            field: field.to_string(),
        })
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.accessors.contains_key(field)
    }

    pub fn primary_key(&self) -> &FieldAccessor {
        &self.primary_key
    }

    pub fn primary_key_field(&self) -> &str {
        self.primary_key.name()
    }

    /// Build a validated record from `(field, value)` pairs.
    ///
    /// Unlisted fields are `Null`. Type mismatches and missing required
    /// fields are rejected.
    pub fn record<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> SchemaResult<Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut values = vec![Value::Null; self.fields.len()];
        for (field, value) in pairs {
            let accessor = self.require_accessor(field.as_ref())?;
            values[accessor.position] = value.into();
        }

        let record = Record { values };
        self.validate(&record)?;
        Ok(record)
    }

    /// Check a record against the declared field types
    pub fn validate(&self, record: &Record) -> SchemaResult<()> {
        if record.values.len() != self.fields.len() {
            return Err(SchemaError::ArityMismatch {
                record_type: self.name.clone(),
                expected: self.fields.len(),
                actual: record.values.len(),
            });
        }

        for (def, value) in self.fields.iter().zip(&record.values) {
            if value.is_null() {
                if def.required {
                    return Err(SchemaError::MissingField(def.name.clone()));
                }
                continue;
            }
            if !def.field_type.accepts(value.tag()) {
                return Err(SchemaError::TypeMismatch {
                    field: def.name.clone(),
                    expected: def.field_type.type_name(),
                    actual: value.tag().as_str(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`RecordType`]
#[derive(Debug)]
pub struct RecordTypeBuilder {
    name: String,
    fields: Vec<FieldDef>,
    primary_key: Option<String>,
}

impl RecordTypeBuilder {
    /// Add an optional field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    /// Add a required field
    pub fn required_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    /// Declare the primary key field. It becomes required.
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    /// Resolve accessors and finish the record type
    pub fn build(mut self) -> SchemaResult<RecordType> {
        let pk_name = self
            .primary_key
            .clone()
            .ok_or_else(|| SchemaError::MissingPrimaryKey(self.name.clone()))?;

        let mut accessors = HashMap::with_capacity(self.fields.len());
        for (position, def) in self.fields.iter().enumerate() {
            let accessor = FieldAccessor {
                position,
                name: Arc::from(def.name.as_str()),
            };
            if accessors.insert(def.name.clone(), accessor).is_some() {
                return Err(SchemaError::DuplicateField(def.name.clone()));
            }
        }

        let primary_key = accessors
            .get(&pk_name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownField {
                record_type: self.name.clone(),
                field: pk_name.clone(),
            })?;
        self.fields[primary_key.position].required = true;

        Ok(RecordType {
            name: self.name,
            fields: self.fields,
            accessors,
            primary_key,
        })
    }
}

/// A record: positional values laid out by its record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Wrap raw positional values. No validation.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, accessor: &FieldAccessor) -> &Value {
        accessor.get(self)
    }
}
