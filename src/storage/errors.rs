//! Storage error types

use thiserror::Error;

use crate::schema::SchemaError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a record store or one of its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage I/O failure: {0}")]
    Io(String),

    #[error("transaction conflict on '{record_type}': committed by another transaction since begin")]
    Conflict { record_type: String },

    #[error("unknown record type '{0}'")]
    UnknownRecordType(String),

    #[error("unknown index '{0}'")]
    UnknownIndex(String),

    #[error("index '{0}' does not maintain ranks")]
    NotRankIndex(String),

    #[error("unique index '{index}' already holds key {key}")]
    UniqueViolation { index: String, key: String },

    #[error("transaction already closed")]
    TransactionClosed,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl StoreError {
    /// Whether the error reports a lost optimistic race
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
