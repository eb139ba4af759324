//! Per-table statistics

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{EstimationError, EstimationResult};

/// Row and distinct-value counts for one record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub record_type: String,
    pub row_count: u64,
    /// Distinct values per field
    #[serde(default)]
    pub distinct_counts: BTreeMap<String, u64>,
    pub refreshed_at: DateTime<Utc>,
}

impl TableStats {
    pub fn new(record_type: impl Into<String>, row_count: u64) -> Self {
        Self {
            record_type: record_type.into(),
            row_count,
            distinct_counts: BTreeMap::new(),
            refreshed_at: Utc::now(),
        }
    }

    pub fn with_distinct(mut self, field: impl Into<String>, distinct: u64) -> Self {
        self.distinct_counts.insert(field.into(), distinct);
        self
    }

    pub fn distinct(&self, field: &str) -> Option<u64> {
        self.distinct_counts.get(field).copied()
    }

    pub fn validate(&self) -> EstimationResult<()> {
        for (field, distinct) in &self.distinct_counts {
            if *distinct > self.row_count {
                return Err(EstimationError::CorruptTableStats {
                    record_type: self.record_type.clone(),
                    reason: format!(
                        "field '{}' has {} distinct values in {} rows",
                        field, distinct, self.row_count
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_above_rows_rejected() {
        let stats = TableStats::new("users", 10).with_distinct("age", 11);
        assert!(matches!(
            stats.validate(),
            Err(EstimationError::CorruptTableStats { .. })
        ));
        TableStats::new("users", 10).with_distinct("age", 10).validate().unwrap();
    }

    #[test]
    fn test_json_shape() {
        let stats = TableStats::new("users", 3).with_distinct("age", 2);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["row_count"], 3);
        assert_eq!(json["distinct_counts"]["age"], 2);
        let back: TableStats = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }
}
