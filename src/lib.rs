//! recordplan - cost-based query planning and streaming plan execution
//! for a record layer over an ordered key-value store
//!
//! Query → rewriter → candidate generator → cost model → plan selector
//! → plan cache → [`Plan::execute`](planner::Plan::execute) → cursors.

pub mod cost;
pub mod executor;
pub mod filter;
pub mod observability;
pub mod planner;
pub mod rank;
pub mod rewriter;
pub mod schema;
pub mod stats;
pub mod storage;
pub mod value;
