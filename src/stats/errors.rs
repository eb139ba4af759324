//! Statistics errors
//!
//! Estimation errors never fail a query. The planner logs them, drops
//! the offending statistics and falls back to default estimates.

use thiserror::Error;

/// Result type for statistics reads
pub type EstimationResult<T> = Result<T, EstimationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimationError {
    #[error("histogram for index '{index}' is corrupt: {reason}")]
    CorruptHistogram { index: String, reason: String },

    #[error("histogram for index '{index}' holds {actual} bounds, field is {expected}")]
    HistogramTypeMismatch {
        index: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("table statistics for '{record_type}' are corrupt: {reason}")]
    CorruptTableStats { record_type: String, reason: String },

    #[error("statistics unavailable: {0}")]
    Unavailable(String),
}

impl EstimationError {
    /// Name of the index or record type the statistics describe
    pub fn subject(&self) -> &str {
        match self {
            EstimationError::CorruptHistogram { index, .. }
            | EstimationError::HistogramTypeMismatch { index, .. } => index,
            EstimationError::CorruptTableStats { record_type, .. } => record_type,
            EstimationError::Unavailable(_) => "",
        }
    }
}
