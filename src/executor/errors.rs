//! Executor error types
//!
//! Error codes:
//! - REC_EXEC_STORE_IO (ERROR)
//! - REC_EXEC_CONFLICT (ERROR)
//! - REC_EXEC_CANCELLED (WARN)
//! - REC_EXEC_CURSOR_ABORTED (ERROR)
//! - REC_EXEC_MISSING_RANK_INDEX (ERROR)
//! - REC_EXEC_INVALID_PLAN (ERROR)
//!
//! Executor errors always reach the caller. Cursors never retry.

use std::fmt;

use crate::storage::StoreError;

/// Severity levels for executor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Stopped on request
    Warn,
    /// Execution failed
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warn => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Executor-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorCode {
    /// Store read failed
    RecExecStoreIo,
    /// Optimistic transaction lost a race
    RecExecConflict,
    /// Cancellation token fired
    RecExecCancelled,
    /// Pull from a cursor that already failed
    RecExecCursorAborted,
    /// Rank predicate or scan without a rank index
    RecExecMissingRankIndex,
    /// Plan does not fit the execution context
    RecExecInvalidPlan,
}

impl ExecutorErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorErrorCode::RecExecStoreIo => "REC_EXEC_STORE_IO",
            ExecutorErrorCode::RecExecConflict => "REC_EXEC_CONFLICT",
            ExecutorErrorCode::RecExecCancelled => "REC_EXEC_CANCELLED",
            ExecutorErrorCode::RecExecCursorAborted => "REC_EXEC_CURSOR_ABORTED",
            ExecutorErrorCode::RecExecMissingRankIndex => "REC_EXEC_MISSING_RANK_INDEX",
            ExecutorErrorCode::RecExecInvalidPlan => "REC_EXEC_INVALID_PLAN",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            ExecutorErrorCode::RecExecCancelled => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ExecutorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Executor error type with full context
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorError {
    code: ExecutorErrorCode,
    message: String,
    /// Store error this was converted from
    source: Option<StoreError>,
}

impl ExecutorError {
    /// Create a store I/O error
    pub fn store_io(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::RecExecStoreIo,
            message: reason.into(),
            source: None,
        }
    }

    /// Create a transaction conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::RecExecConflict,
            message: reason.into(),
            source: None,
        }
    }

    /// Create a cancellation error
    pub fn cancelled() -> Self {
        Self {
            code: ExecutorErrorCode::RecExecCancelled,
            message: "Query cancelled".to_string(),
            source: None,
        }
    }

    /// Create a cursor aborted error
    pub fn cursor_aborted(cursor: &str) -> Self {
        Self {
            code: ExecutorErrorCode::RecExecCursorAborted,
            message: format!("{} cursor failed earlier and cannot continue", cursor),
            source: None,
        }
    }

    /// Create a missing rank index error
    pub fn missing_rank_index(field: &str) -> Self {
        Self {
            code: ExecutorErrorCode::RecExecMissingRankIndex,
            message: format!("No rank index serves field '{}'", field),
            source: None,
        }
    }

    /// Create an invalid plan error
    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::RecExecInvalidPlan,
            message: reason.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ExecutorErrorCode {
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

    /// Returns the store error behind this one, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        self.source.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ExecutorErrorCode::RecExecCancelled
    }

    pub fn is_conflict(&self) -> bool {
        self.code == ExecutorErrorCode::RecExecConflict
    }
}

impl From<StoreError> for ExecutorError {
    fn from(err: StoreError) -> Self {
        let mut converted = if err.is_conflict() {
            Self::conflict(err.to_string())
        } else {
            Self::store_io(err.to_string())
        };
        converted.source = Some(err);
        converted
    }
}

impl fmt::Display for ExecutorError {
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

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ExecutorErrorCode::RecExecStoreIo.code(), "REC_EXEC_STORE_IO");
        assert_eq!(ExecutorErrorCode::RecExecCancelled.code(), "REC_EXEC_CANCELLED");
        assert_eq!(ExecutorErrorCode::RecExecInvalidPlan.code(), "REC_EXEC_INVALID_PLAN");
    }

    #[test]
    fn test_cancelled_is_warning() {
        let err = ExecutorError::cancelled();
        assert!(err.is_cancelled());
        assert_eq!(err.severity(), Severity::Warn);
        assert_eq!(ExecutorError::store_io("disk").severity(), Severity::Error);
    }

    #[test]
    fn test_store_error_conversion() {
        let err: ExecutorError = StoreError::Conflict {
            record_type: "users".into(),
        }
        .into();
        assert!(err.is_conflict());
        assert!(err.store_error().is_some());

        let err: ExecutorError = StoreError::Io("disk unplugged".into()).into();
        assert_eq!(err.code(), ExecutorErrorCode::RecExecStoreIo);
        assert!(err.message().contains("disk unplugged"));
    }

    #[test]
    fn test_error_display() {
        let err = ExecutorError::missing_rank_index("score");
        let display = err.to_string();
        assert!(display.starts_with("[ERROR] REC_EXEC_MISSING_RANK_INDEX:"));
        assert!(display.contains("score"));
    }
}
