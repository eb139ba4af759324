//! Index catalog consumed by the planner

use std::collections::BTreeMap;
use std::sync::Arc;

use super::errors::{SchemaError, SchemaResult};
use super::index::IndexDescriptor;
use super::record::RecordType;

/// Read-only view of registered record types and indexes.
///
/// Implementations must return indexes in a deterministic order.
pub trait IndexCatalog {
    /// Look up a registered record type
    fn record_type(&self, name: &str) -> Option<Arc<RecordType>>;

    /// All indexes on a record type
    fn indexes(&self, record_type: &str) -> Vec<Arc<IndexDescriptor>>;

    /// Indexes on a record type whose leading key field is `field`
    fn indexes_for_field(&self, record_type: &str, field: &str) -> Vec<Arc<IndexDescriptor>> {
        self.indexes(record_type)
            .into_iter()
            .filter(|idx| idx.leading_field() == Some(field))
            .collect()
    }

    /// Whether at most one record can carry a given full key
    fn is_unique(&self, index: &IndexDescriptor) -> bool {
        index.unique
    }
}

/// In-memory catalog keyed by name.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    record_types: BTreeMap<String, Arc<RecordType>>,
    indexes: BTreeMap<String, Arc<IndexDescriptor>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type
    pub fn register_record_type(&mut self, record_type: RecordType) -> SchemaResult<Arc<RecordType>> {
        let name = record_type.name().to_string();
        if self.record_types.contains_key(&name) {
            return Err(SchemaError::DuplicateRecordType(name));
        }
        let record_type = Arc::new(record_type);
        self.record_types.insert(name, Arc::clone(&record_type));
        Ok(record_type)
    }

    /// Register an index. Its record type and fields must already exist.
    pub fn register_index(&mut self, index: IndexDescriptor) -> SchemaResult<Arc<IndexDescriptor>> {
        if self.indexes.contains_key(&index.name) {
            return Err(SchemaError::DuplicateIndex(index.name));
        }

        let record_type = self
            .record_types
            .get(&index.record_type)
            .ok_or_else(|| SchemaError::UnknownRecordType(index.record_type.clone()))?;

        if index.key_fields.is_empty() {
            return Err(SchemaError::InvalidIndex {
                index: index.name,
                reason: "no key fields".into(),
            });
        }
        if index.is_rank() && index.key_fields.len() != 1 {
            return Err(SchemaError::InvalidIndex {
                index: index.name,
                reason: "rank indexes have exactly one key field".into(),
            });
        }
        for field in index.key_fields.iter().chain(&index.covering_fields) {
            record_type.require_accessor(field)?;
        }

        let index = Arc::new(index);
        self.indexes.insert(index.name.clone(), Arc::clone(&index));
        Ok(index)
    }

    /// Look up an index by name
    pub fn index(&self, name: &str) -> Option<Arc<IndexDescriptor>> {
        self.indexes.get(name).cloned()
    }

    /// All registered indexes, by name
    pub fn all_indexes(&self) -> impl Iterator<Item = &Arc<IndexDescriptor>> {
        self.indexes.values()
    }
}

impl IndexCatalog for SchemaCatalog {
    fn record_type(&self, name: &str) -> Option<Arc<RecordType>> {
        self.record_types.get(name).cloned()
    }

    fn indexes(&self, record_type: &str) -> Vec<Arc<IndexDescriptor>> {
        self.indexes
            .values()
            .filter(|idx| idx.record_type == record_type)
            .cloned()
            .collect()
    }
}
