//! Cost model tuning constants

use serde::{Deserialize, Serialize};

/// Unit costs and fallback selectivities.
///
/// All fields default, so a partial JSON object is a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConstants {
    /// I/O per record read sequentially
    pub seq_row_cost: f64,
    /// CPU per record handled
    pub cpu_row_cost: f64,
    /// I/O to position an index cursor
    pub index_seek_cost: f64,
    /// I/O per index entry read
    pub index_row_cost: f64,
    /// I/O per record fetched by primary key
    pub fetch_cost: f64,
    /// CPU per residual predicate evaluation
    pub predicate_cost: f64,
    /// Equality selectivity with no histogram or distinct count
    pub default_equality_selectivity: f64,
    /// Range selectivity with no histogram
    pub default_range_selectivity: f64,
    /// Table size assumed without table statistics
    pub default_table_rows: f64,
    /// Rows assumed for an index scan without table statistics
    pub default_index_rows: f64,
}

impl Default for CostConstants {
    fn default() -> Self {
        Self {
            seq_row_cost: 1.0,
            cpu_row_cost: 0.1,
            index_seek_cost: 4.0,
            index_row_cost: 0.5,
            fetch_cost: 1.0,
            predicate_cost: 0.05,
            default_equality_selectivity: 0.005,
            default_range_selectivity: 1.0 / 3.0,
            default_table_rows: 1e6,
            default_index_rows: 1e4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let constants: CostConstants = serde_json::from_str(r#"{"fetch_cost": 2.5}"#).unwrap();
        assert_eq!(constants.fetch_cost, 2.5);
        assert_eq!(constants.seq_row_cost, 1.0);
        assert_eq!(constants.default_table_rows, 1e6);
    }
}
