//! Rewriter limits

use serde::{Deserialize, Serialize};

/// Default cap on DNF terms
pub const DEFAULT_MAX_DNF_TERMS: usize = 100;

/// Default cap on filter nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Bounds applied while rewriting a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// DNF expansion is skipped when it would produce more terms
    pub max_dnf_terms: usize,
    /// Filters nested deeper are rejected
    pub max_depth: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_dnf_terms: DEFAULT_MAX_DNF_TERMS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RewriteConfig {
    pub fn with_max_dnf_terms(mut self, max_dnf_terms: usize) -> Self {
        self.max_dnf_terms = max_dnf_terms;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
