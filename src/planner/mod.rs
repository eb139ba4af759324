//! Query planner
//!
//! Turns a declarative [`Query`] into a physical [`Plan`].
//!
//! # Pipeline
//!
//! 1. Validate the query against the index catalog
//! 2. Look the fingerprint up in the plan cache
//! 3. Rewrite the filter (normalization, bounded DNF)
//! 4. Gather a statistics snapshot
//! 5. Generate candidate plans
//! 6. Select: minimum cost with table statistics, ordered heuristics
//!    without
//! 7. Cache the selection
//!
//! Planning never touches the record store. Every selection is logged.

mod cache;
mod config;
mod errors;
mod explain;
mod generator;
mod plan;
mod query;
mod selector;

pub use cache::{CacheEntry, CacheError, PlanCache};
pub use config::{
    PlannerConfig, DEFAULT_IN_JOIN_BATCH_SIZE, DEFAULT_MAX_CANDIDATE_PLANS, DEFAULT_MAX_IN_VALUES,
    DEFAULT_PLAN_CACHE_CAPACITY,
};
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use explain::ExplainPlan;
pub use generator::CandidateGenerator;
pub use plan::{shared_merge_key, IndexScanPlan, Plan, PlanOrdering, ScanBounds};
pub use query::Query;
pub use selector::{PlanSelector, SelectedPlan, SelectionMode};
