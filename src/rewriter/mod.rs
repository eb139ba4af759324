//! Query rewriter
//!
//! Runs before candidate generation:
//!
//! 1. Depth check against `max_depth`
//! 2. Normalization (NOT push-down, flattening, redundancy removal)
//! 3. Bounded DNF expansion, offered alongside the normalized tree
//!
//! The rewritten filter matches exactly the records the input matches.

mod config;
mod dnf;
mod normalize;

pub use config::{RewriteConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_DNF_TERMS};
pub use dnf::{estimate_terms, to_dnf};
pub use normalize::normalize;

use crate::filter::Filter;
use crate::planner::{PlannerError, PlannerResult};

/// Output of [`rewrite`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    /// Normalized filter; the primary source for candidate plans
    pub filter: Filter,
    /// DNF form when expansion ran and changed the tree
    pub dnf: Option<Filter>,
    /// Term estimate of the normalized filter
    pub estimated_terms: usize,
    /// Whether expansion was skipped for exceeding `max_dnf_terms`
    pub dnf_skipped: bool,
}

/// Rewrite a filter within the configured bounds
pub fn rewrite(filter: &Filter, config: &RewriteConfig) -> PlannerResult<Rewritten> {
    let depth = filter.depth();
    if depth > config.max_depth {
        return Err(PlannerError::filter_too_deep(depth, config.max_depth));
    }

    let normalized = normalize(filter);
    let estimated_terms = estimate_terms(&normalized);
    let dnf = to_dnf(&normalized, config.max_dnf_terms);
    let dnf_skipped = dnf.is_none();

    Ok(Rewritten {
        dnf: dnf.filter(|d| *d != normalized),
        filter: normalized,
        estimated_terms,
        dnf_skipped,
    })
}
