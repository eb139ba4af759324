//! Plan execution
//!
//! [`Plan::execute`](crate::planner::Plan::execute) turns a plan into a
//! tree of streaming cursors. Cursors are pull-driven and forward-only;
//! nothing is read until the first `next()`.
//!
//! # Buffering
//!
//! - Ordered union: one pending record per child
//! - Merge intersection: one head per child
//! - Unordered union: the set of dedup keys already emitted
//! - IN-join: the scans of one batch
//!
//! # Failure
//!
//! Any store error aborts the whole cursor tree on the pull that hit it.
//! Cancellation is checked on every pull.

mod build;
mod context;
mod cursor;
mod errors;
mod filter;
mod in_join;
mod intersection;
mod scan;
mod union;

pub use context::ExecuteContext;
pub use cursor::{CancellationToken, CursorState, RecordCursor};
pub use errors::{ExecutorError, ExecutorErrorCode, ExecutorResult, Severity};
