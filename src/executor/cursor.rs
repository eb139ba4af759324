//! Cursor state machine
//!
//! Every cursor moves through `NotStarted -> Active -> Exhausted` or
//! `-> Failed`. `next()` is the only transition. Exhausted cursors keep
//! returning `Ok(None)`, failed cursors keep returning
//! `REC_EXEC_CURSOR_ABORTED`, and nothing restarts.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::{ExecutorError, ExecutorResult};
use crate::schema::Record;

/// Lifecycle of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    NotStarted,
    Active,
    Exhausted,
    Failed,
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CursorState::NotStarted => "NOT_STARTED",
            CursorState::Active => "ACTIVE",
            CursorState::Exhausted => "EXHAUSTED",
            CursorState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Forward-only, pull-driven stream of records.
pub trait RecordCursor {
    /// Next record, `None` once exhausted
    fn next(&mut self) -> ExecutorResult<Option<Record>>;

    fn state(&self) -> CursorState;

    /// Drain the cursor
    fn collect_remaining(&mut self) -> ExecutorResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// Cooperative cancellation flag shared between a caller and its cursors.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cursor body without state tracking
pub(crate) trait Advance {
    fn advance(&mut self) -> ExecutorResult<Option<Record>>;

    fn name(&self) -> &'static str;
}

/// Adds the state machine and cancellation checks to a cursor body
pub(crate) struct Stateful<C> {
    inner: C,
    state: CursorState,
    cancel: CancellationToken,
}

impl<C: Advance> Stateful<C> {
    pub(crate) fn new(inner: C, cancel: CancellationToken) -> Self {
        Self {
            inner,
            state: CursorState::NotStarted,
            cancel,
        }
    }
}

impl<C: Advance> RecordCursor for Stateful<C> {
    fn next(&mut self) -> ExecutorResult<Option<Record>> {
        match self.state {
            CursorState::Exhausted => return Ok(None),
            CursorState::Failed => return Err(ExecutorError::cursor_aborted(self.inner.name())),
            CursorState::NotStarted | CursorState::Active => {}
        }
        if self.cancel.is_cancelled() {
            self.state = CursorState::Failed;
            return Err(ExecutorError::cancelled());
        }

        self.state = CursorState::Active;
        match self.inner.advance() {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                self.state = CursorState::Exhausted;
                Ok(None)
            }
            Err(err) => {
                self.state = CursorState::Failed;
                Err(err)
            }
        }
    }

    fn state(&self) -> CursorState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorErrorCode;
    use crate::value::Value;

    struct Scripted {
        steps: Vec<ExecutorResult<Option<Record>>>,
    }

    impl Advance for Scripted {
        fn advance(&mut self) -> ExecutorResult<Option<Record>> {
            if self.steps.is_empty() {
                return Ok(None);
            }
            self.steps.remove(0)
        }

        fn name(&self) -> &'static str {
            "Scripted"
        }
    }

    fn record(id: i64) -> Record {
        Record::from_values(vec![Value::Int(id)])
    }

    #[test]
    fn test_exhausted_stays_exhausted() {
        let mut cursor = Stateful::new(
            Scripted {
                steps: vec![Ok(Some(record(1))), Ok(None), Ok(Some(record(2)))],
            },
            CancellationToken::new(),
        );
        assert_eq!(cursor.state(), CursorState::NotStarted);
        assert_eq!(cursor.next().unwrap(), Some(record(1)));
        assert_eq!(cursor.state(), CursorState::Active);
        assert_eq!(cursor.next().unwrap(), None);
        assert_eq!(cursor.next().unwrap(), None);
        assert_eq!(cursor.state(), CursorState::Exhausted);
    }

    #[test]
    fn test_failure_is_sticky() {
        let mut cursor = Stateful::new(
            Scripted {
                steps: vec![Err(ExecutorError::store_io("boom")), Ok(Some(record(1)))],
            },
            CancellationToken::new(),
        );
        assert_eq!(cursor.next().unwrap_err().code(), ExecutorErrorCode::RecExecStoreIo);
        assert_eq!(cursor.state(), CursorState::Failed);
        assert_eq!(
            cursor.next().unwrap_err().code(),
            ExecutorErrorCode::RecExecCursorAborted
        );
    }

    #[test]
    fn test_cancellation_checked_on_pull() {
        let token = CancellationToken::new();
        let mut cursor = Stateful::new(
            Scripted {
                steps: vec![Ok(Some(record(1))), Ok(Some(record(2)))],
            },
            token.clone(),
        );
        assert!(cursor.next().unwrap().is_some());
        token.cancel();
        assert!(cursor.next().unwrap_err().is_cancelled());
        assert_eq!(cursor.state(), CursorState::Failed);
    }

    #[test]
    fn test_collect_remaining() {
        let mut cursor = Stateful::new(
            Scripted {
                steps: vec![Ok(Some(record(1))), Ok(Some(record(2)))],
            },
            CancellationToken::new(),
        );
        assert_eq!(cursor.collect_remaining().unwrap(), vec![record(1), record(2)]);
    }
}
