//! Declarative queries

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{PlannerError, PlannerResult};
use crate::filter::{canonical_text, rank_index_for, Filter, Fingerprint};
use crate::schema::{IndexCatalog, RecordType};

/// A query over one record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub record_type: String,
    #[serde(default = "Filter::always")]
    pub filter: Filter,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Fields the caller reads. `None` means the whole record.
    #[serde(default)]
    pub required_fields: Option<Vec<String>>,
}

impl Query {
    /// Query matching every record of a type
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            filter: Filter::always(),
            limit: None,
            required_fields: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_required_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Text identifying the query up to AND/OR child order and IN-list order
    pub fn canonical_text(&self) -> String {
        let limit = self.limit.map_or_else(|| "none".to_string(), |l| l.to_string());
        let fields = match &self.required_fields {
            Some(fields) => {
                let mut sorted: Vec<&str> = fields.iter().map(String::as_str).collect();
                sorted.sort_unstable();
                sorted.dedup();
                format!("{:?}", sorted)
            }
            None => "*".to_string(),
        };
        format!(
            "type={:?};filter={};limit={};fields={}",
            self.record_type,
            canonical_text(&self.filter),
            limit,
            fields
        )
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.canonical_text())
    }

    /// Reject filters nested deeper than `max_depth`.
    ///
    /// Canonical text and validation recurse over the filter, so this runs
    /// before either.
    pub fn check_depth(&self, max_depth: usize) -> PlannerResult<()> {
        let depth = self.filter.depth();
        if depth > max_depth {
            return Err(PlannerError::filter_too_deep(depth, max_depth));
        }
        Ok(())
    }

    /// Check the query against the catalog and resolve its record type
    pub fn validate(&self, catalog: &dyn IndexCatalog) -> PlannerResult<Arc<RecordType>> {
        let record_type = catalog
            .record_type(&self.record_type)
            .ok_or_else(|| PlannerError::unknown_record_type(&self.record_type))?;

        if self.limit == Some(0) {
            return Err(PlannerError::invalid_query("limit must be at least 1"));
        }

        let required = self.required_fields.iter().flatten().map(String::as_str);
        for field in self.filter.fields().into_iter().chain(required) {
            if !record_type.has_field(field) {
                return Err(PlannerError::unknown_field(&self.record_type, field));
            }
        }

        for field in self.filter.rank_fields() {
            rank_index_for(catalog, &record_type, field)
                .map_err(|_| PlannerError::missing_rank_index(field))?;
        }
        Ok(record_type)
    }
}
