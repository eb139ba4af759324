//! Schema and catalog errors

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while registering record types and indexes, or while
/// building records against a registered type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Record type registered twice
    #[error("Record type '{0}' already registered")]
    DuplicateRecordType(String),

    /// Record type not registered
    #[error("Unknown record type '{0}'")]
    UnknownRecordType(String),

    /// Field not declared on the record type
    #[error("Record type '{record_type}' has no field '{field}'")]
    UnknownField { record_type: String, field: String },

    /// Field declared twice on one record type
    #[error("Field '{0}' declared more than once")]
    DuplicateField(String),

    /// Record type declared without a primary key
    #[error("Record type '{0}' has no primary key field")]
    MissingPrimaryKey(String),

    /// Index name already taken
    #[error("Index '{0}' already registered")]
    DuplicateIndex(String),

    /// Index definition rejected
    #[error("Invalid index '{index}': {reason}")]
    InvalidIndex { index: String, reason: String },

    /// Record value does not match the declared field type
    #[error("Field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Record value count differs from the declared field count
    #[error("Record type '{record_type}' declares {expected} fields, record has {actual}")]
    ArityMismatch {
        record_type: String,
        expected: usize,
        actual: usize,
    },

    /// Required field missing or null
    #[error("Required field '{0}' is missing")]
    MissingField(String),

    /// Rank predicate on a field without a rank index
    #[error("Record type '{record_type}' has no rank index on '{field}'")]
    MissingRankIndex { record_type: String, field: String },
}
