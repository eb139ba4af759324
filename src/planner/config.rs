//! Planner configuration
//!
//! Every field has a default, so a partial JSON document is a complete
//! configuration. Loaded configs are validated before use.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{PlannerError, PlannerResult};
use crate::cost::CostConstants;
use crate::observability::{Event, Logger, Severity};
use crate::rewriter::{RewriteConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_DNF_TERMS};

/// Default cap on candidate plans per query
pub const DEFAULT_MAX_CANDIDATE_PLANS: usize = 20;

/// Default longest IN list planned as an IN-join
pub const DEFAULT_MAX_IN_VALUES: usize = 100;

/// Default values per IN-join batch
pub const DEFAULT_IN_JOIN_BATCH_SIZE: usize = 50;

/// Default plan cache capacity
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 256;

/// Bounds and switches for planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// DNF expansion is skipped above this many terms
    pub max_dnf_terms: usize,
    /// Deeper filters are rejected
    pub max_depth: usize,
    /// Candidate plans kept per query
    pub max_candidate_plans: usize,
    /// Longer IN lists never become IN-joins
    pub max_in_values: usize,
    /// Values looked up per IN-join batch
    pub in_join_batch_size: usize,
    /// Plans kept by the plan cache
    pub plan_cache_capacity: usize,
    /// Whether a full scan may be chosen
    pub allow_full_scan: bool,
    /// Lowest severity logged: trace, info, warn or error
    pub log_level: String,
    pub cost: CostConstants,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_dnf_terms: DEFAULT_MAX_DNF_TERMS,
            max_depth: DEFAULT_MAX_DEPTH,
            max_candidate_plans: DEFAULT_MAX_CANDIDATE_PLANS,
            max_in_values: DEFAULT_MAX_IN_VALUES,
            in_join_batch_size: DEFAULT_IN_JOIN_BATCH_SIZE,
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
            allow_full_scan: true,
            log_level: "info".to_string(),
            cost: CostConstants::default(),
        }
    }
}

impl PlannerConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> PlannerResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PlannerError::invalid_config(format!("Invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn load(path: &Path) -> PlannerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PlannerError::invalid_config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// [`load`](Self::load), then report the effective bounds
    pub fn load_logged(path: &Path, logger: &Logger) -> PlannerResult<Self> {
        let config = Self::load(path)?;
        logger.event(
            Event::ConfigLoaded,
            &[
                ("allow_full_scan", if config.allow_full_scan { "true" } else { "false" }),
                ("log_level", &config.log_level),
                ("max_dnf_terms", &config.max_dnf_terms.to_string()),
                ("max_in_values", &config.max_in_values.to_string()),
                ("path", &path.display().to_string()),
                ("plan_cache_capacity", &config.plan_cache_capacity.to_string()),
            ],
        );
        Ok(config)
    }

    /// Reject bounds that would make planning impossible
    pub fn validate(&self) -> PlannerResult<()> {
        let bounds = [
            ("max_dnf_terms", self.max_dnf_terms),
            ("max_depth", self.max_depth),
            ("max_candidate_plans", self.max_candidate_plans),
            ("max_in_values", self.max_in_values),
            ("in_join_batch_size", self.in_join_batch_size),
            ("plan_cache_capacity", self.plan_cache_capacity),
        ];
        for (name, value) in bounds {
            if value == 0 {
                return Err(PlannerError::invalid_config(format!("{} must be at least 1", name)));
            }
        }
        if Severity::parse(&self.log_level).is_none() {
            return Err(PlannerError::invalid_config(format!(
                "Unknown log level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Rewriter bounds
    pub fn rewrite(&self) -> RewriteConfig {
        RewriteConfig::default()
            .with_max_dnf_terms(self.max_dnf_terms)
            .with_max_depth(self.max_depth)
    }

    /// Configured log threshold, INFO when unparseable
    pub fn log_threshold(&self) -> Severity {
        Severity::parse(&self.log_level).unwrap_or(Severity::Info)
    }

    /// Console logger at the configured threshold
    pub fn console_logger(&self) -> Logger {
        Logger::console().with_threshold(self.log_threshold())
    }

    pub fn with_max_dnf_terms(mut self, max_dnf_terms: usize) -> Self {
        self.max_dnf_terms = max_dnf_terms;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_candidate_plans(mut self, max_candidate_plans: usize) -> Self {
        self.max_candidate_plans = max_candidate_plans;
        self
    }

    pub fn with_max_in_values(mut self, max_in_values: usize) -> Self {
        self.max_in_values = max_in_values;
        self
    }

    pub fn with_in_join_batch_size(mut self, in_join_batch_size: usize) -> Self {
        self.in_join_batch_size = in_join_batch_size;
        self
    }

    pub fn with_plan_cache_capacity(mut self, plan_cache_capacity: usize) -> Self {
        self.plan_cache_capacity = plan_cache_capacity;
        self
    }

    pub fn with_allow_full_scan(mut self, allow_full_scan: bool) -> Self {
        self.allow_full_scan = allow_full_scan;
        self
    }

    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn with_cost(mut self, cost: CostConstants) -> Self {
        self.cost = cost;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannerErrorCode;

    #[test]
    fn test_defaults() {
        let config = PlannerConfig::default();
        assert_eq!(config.max_dnf_terms, 100);
        assert_eq!(config.max_depth, 20);
        assert_eq!(config.max_candidate_plans, 20);
        assert_eq!(config.max_in_values, 100);
        assert!(config.allow_full_scan);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = PlannerConfig::from_json_str(
            r#"{"max_in_values": 10, "allow_full_scan": false, "cost": {"fetch_cost": 3.0}}"#,
        )
        .unwrap();
        assert_eq!(config.max_in_values, 10);
        assert!(!config.allow_full_scan);
        assert_eq!(config.cost.fetch_cost, 3.0);
        assert_eq!(config.max_dnf_terms, 100);
        assert_eq!(config.rewrite().max_dnf_terms, 100);
    }

    #[test]
    fn test_zero_bound_rejected() {
        let err = PlannerConfig::from_json_str(r#"{"max_candidate_plans": 0}"#).unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::RecPlanInvalidConfig);
        assert!(err.message().contains("max_candidate_plans"));

        let err = PlannerConfig::default().with_log_level("loud").validate().unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::RecPlanInvalidConfig);
    }

    #[test]
    fn test_malformed_json() {
        let err = PlannerConfig::from_json_str("{not json").unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::RecPlanInvalidConfig);
    }
}
