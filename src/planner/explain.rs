//! Explain reports
//!
//! Deterministic, human-readable account of one plan selection: the plan
//! tree, its estimated cost, how many candidates were weighed and whether
//! the cache answered. Rejected queries report the error code instead.

use std::fmt;

use serde::Serialize;

use super::errors::PlannerError;
use crate::filter::Fingerprint;
use super::query::Query;
use super::selector::SelectedPlan;

/// Explain report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainPlan {
    /// Whether planning succeeded
    pub accepted: bool,
    pub record_type: String,
    pub fingerprint: String,
    /// Access path under any filter and limit
    pub plan_type: Option<String>,
    /// Output of [`Plan::explain`](super::Plan::explain)
    pub plan_text: Option<String>,
    pub estimated_rows: Option<i64>,
    pub io_cost: Option<f64>,
    pub cpu_cost: Option<f64>,
    pub total_cost: Option<f64>,
    pub candidates: usize,
    pub cache_hit: bool,
    pub mode: Option<String>,
    /// Rejection error code (if rejected)
    pub rejection_code: Option<String>,
    /// Rejection reason (if rejected)
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    /// Report for a successful selection
    pub fn from_selection(query: &Query, selected: &SelectedPlan) -> Self {
        Self {
            accepted: true,
            record_type: query.record_type.clone(),
            fingerprint: selected.fingerprint.to_hex(),
            plan_type: Some(selected.plan.plan_type().to_string()),
            plan_text: Some(selected.plan.explain()),
            estimated_rows: Some(selected.cost.estimated_rows),
            io_cost: Some(selected.cost.io_cost),
            cpu_cost: Some(selected.cost.cpu_cost),
            total_cost: Some(selected.cost.total()),
            candidates: selected.candidates,
            cache_hit: selected.cache_hit,
            mode: Some(selected.mode.as_str().to_string()),
            rejection_code: None,
            rejection_reason: None,
        }
    }

    /// Report for a rejected query
    ///
    /// Queries rejected before fingerprinting report `-` as the fingerprint.
    pub fn from_error(query: &Query, fingerprint: Option<Fingerprint>, err: &PlannerError) -> Self {
        Self {
            accepted: false,
            record_type: query.record_type.clone(),
            fingerprint: fingerprint.map_or_else(|| "-".to_string(), |fp| fp.to_hex()),
            plan_type: None,
            plan_text: None,
            estimated_rows: None,
            io_cost: None,
            cpu_cost: None,
            total_cost: None,
            candidates: 0,
            cache_hit: false,
            mode: None,
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(err.message().to_string()),
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;
        writeln!(f, "Record Type: {}", self.record_type)?;
        writeln!(f, "Fingerprint: {}", self.fingerprint)?;

        if !self.accepted {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
            return Ok(());
        }

        writeln!(f, "Status: ACCEPTED")?;
        if let Some(mode) = &self.mode {
            writeln!(f, "Selection: {}", mode)?;
        }
        writeln!(f, "Candidates: {}", self.candidates)?;
        writeln!(f, "Cache Hit: {}", self.cache_hit)?;
        if let Some(rows) = self.estimated_rows {
            writeln!(f, "Estimated Rows: {}", rows)?;
        }
        if let (Some(io), Some(cpu), Some(total)) = (self.io_cost, self.cpu_cost, self.total_cost) {
            writeln!(f, "Cost: io={:.2} cpu={:.2} total={:.2}", io, cpu, total)?;
        }
        if let Some(text) = &self.plan_text {
            writeln!(f, "Plan:")?;
            for line in text.lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        Ok(())
    }
}
