//! Planner error types
//!
//! Error codes:
//! - REC_PLAN_UNKNOWN_RECORD_TYPE (REJECT)
//! - REC_PLAN_UNKNOWN_FIELD (REJECT)
//! - REC_PLAN_FILTER_TOO_DEEP (REJECT)
//! - REC_PLAN_NO_MATCHING_INDEX (REJECT)
//! - REC_PLAN_MISSING_RANK_INDEX (REJECT)
//! - REC_PLAN_INVALID_QUERY (REJECT)
//! - REC_PLAN_INVALID_CONFIG (REJECT)
//!
//! Planner errors fail the query before any store I/O.

use std::fmt;

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Query rejected
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Record type not registered
    RecPlanUnknownRecordType,
    /// Filter or required field not on the record type
    RecPlanUnknownField,
    /// Filter nested deeper than the configured limit
    RecPlanFilterTooDeep,
    /// Full scans disallowed and no index matches
    RecPlanNoMatchingIndex,
    /// Rank predicate on a field without a rank index
    RecPlanMissingRankIndex,
    /// Malformed query
    RecPlanInvalidQuery,
    /// Planner configuration rejected
    RecPlanInvalidConfig,
}

impl PlannerErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::RecPlanUnknownRecordType => "REC_PLAN_UNKNOWN_RECORD_TYPE",
            PlannerErrorCode::RecPlanUnknownField => "REC_PLAN_UNKNOWN_FIELD",
            PlannerErrorCode::RecPlanFilterTooDeep => "REC_PLAN_FILTER_TOO_DEEP",
            PlannerErrorCode::RecPlanNoMatchingIndex => "REC_PLAN_NO_MATCHING_INDEX",
            PlannerErrorCode::RecPlanMissingRankIndex => "REC_PLAN_MISSING_RANK_INDEX",
            PlannerErrorCode::RecPlanInvalidQuery => "REC_PLAN_INVALID_QUERY",
            PlannerErrorCode::RecPlanInvalidConfig => "REC_PLAN_INVALID_CONFIG",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error type with full context
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
    /// Field name if applicable
    field: Option<String>,
}

impl PlannerError {
    /// Create an unknown record type error
    pub fn unknown_record_type(name: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::RecPlanUnknownRecordType,
            message: format!("Record type '{}' is not registered", name.into()),
            field: None,
        }
    }

    /// Create an unknown field error
    pub fn unknown_field(record_type: &str, field: impl Into<String>) -> Self {
        let f = field.into();
        Self {
            code: PlannerErrorCode::RecPlanUnknownField,
            message: format!("Record type '{}' has no field '{}'", record_type, f),
            field: Some(f),
        }
    }

    /// Create a filter too deep error
    pub fn filter_too_deep(depth: usize, max_depth: usize) -> Self {
        Self {
            code: PlannerErrorCode::RecPlanFilterTooDeep,
            message: format!("Filter depth {} exceeds maximum {}", depth, max_depth),
            field: None,
        }
    }

    /// Create a no matching index error
    pub fn no_matching_index(record_type: &str) -> Self {
        Self {
            code: PlannerErrorCode::RecPlanNoMatchingIndex,
            message: format!(
                "No index matches the filter on '{}' and full scans are disallowed",
                record_type
            ),
            field: None,
        }
    }

    /// Create a missing rank index error
    pub fn missing_rank_index(field: impl Into<String>) -> Self {
        let f = field.into();
        Self {
            code: PlannerErrorCode::RecPlanMissingRankIndex,
            message: format!("Rank predicate on '{}' needs a rank index", f),
            field: Some(f),
        }
    }

    /// Create an invalid query error
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::RecPlanInvalidQuery,
            message: reason.into(),
            field: None,
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::RecPlanInvalidConfig,
            message: reason.into(),
            field: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the field name if applicable
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
