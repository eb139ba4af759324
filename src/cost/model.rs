//! Plan cost estimation
//!
//! `estimate` is pure and total: every plan gets a cost, whatever the
//! statistics look like. Without table statistics fixed defaults apply.

use std::ops::Bound;

use serde::Serialize;

use super::constants::CostConstants;
use crate::filter::{ComparisonOp, Filter};
use crate::planner::{IndexScanPlan, Plan, ScanBounds};
use crate::stats::StatisticsSnapshot;
use crate::value::Value;

/// Weight of CPU cost in [`QueryCost::total`]
pub const CPU_WEIGHT: f64 = 0.1;

/// Estimated cost of running a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryCost {
    pub io_cost: f64,
    pub cpu_cost: f64,
    /// Never below 1
    pub estimated_rows: i64,
}

impl QueryCost {
    /// Build a cost, flooring the row estimate at 1
    pub fn new(io_cost: f64, cpu_cost: f64, rows: f64) -> Self {
        let rows = if rows.is_finite() { rows.ceil() } else { 1.0 };
        Self {
            io_cost: non_negative(io_cost),
            cpu_cost: non_negative(cpu_cost),
            estimated_rows: (rows.max(1.0)).min(i64::MAX as f64) as i64,
        }
    }

    /// I/O plus weighted CPU
    pub fn total(&self) -> f64 {
        self.io_cost + CPU_WEIGHT * self.cpu_cost
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        f64::MAX
    }
}

/// Unfloored estimate carried through the recursion
#[derive(Debug, Clone, Copy, Default)]
struct Estimate {
    io: f64,
    cpu: f64,
    rows: f64,
}

/// Maps a plan and a statistics snapshot to a [`QueryCost`].
#[derive(Debug, Clone, Default)]
pub struct CostModel {
    constants: CostConstants,
}

impl CostModel {
    pub fn new(constants: CostConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &CostConstants {
        &self.constants
    }

    /// Cost of `plan` under `snapshot`
    pub fn estimate(&self, plan: &Plan, snapshot: &StatisticsSnapshot) -> QueryCost {
        let e = self.estimate_node(plan, snapshot);
        QueryCost::new(e.io, e.cpu, e.rows)
    }

    fn table_rows(&self, snapshot: &StatisticsSnapshot) -> f64 {
        snapshot
            .row_count()
            .map_or(self.constants.default_table_rows, |r| r as f64)
    }

    fn estimate_node(&self, plan: &Plan, snapshot: &StatisticsSnapshot) -> Estimate {
        let c = &self.constants;
        match plan {
            Plan::FullScan { .. } => {
                let n = self.table_rows(snapshot);
                Estimate {
                    io: n * c.seq_row_cost,
                    cpu: n * c.cpu_row_cost,
                    rows: n,
                }
            }
            Plan::IndexScan(scan) => {
                if !snapshot.has_table_stats() {
                    let r = c.default_index_rows;
                    return Estimate {
                        io: r * c.seq_row_cost,
                        cpu: r * c.cpu_row_cost,
                        rows: r,
                    };
                }
                let rows = self.scan_rows(scan, snapshot);
                let fetch = if scan.covering { 0.0 } else { rows * c.fetch_cost };
                Estimate {
                    io: c.index_seek_cost + rows * c.index_row_cost + fetch,
                    cpu: rows * c.cpu_row_cost,
                    rows,
                }
            }
            Plan::Intersection { children, .. } => {
                let n = self.table_rows(snapshot);
                let mut total = Estimate::default();
                let mut selectivity = 1.0;
                for child in children {
                    let e = self.estimate_node(child, snapshot);
                    total.io += e.io;
                    total.cpu += e.cpu;
                    selectivity *= if n > 0.0 {
                        (e.rows / n).min(1.0)
                    } else {
                        c.default_equality_selectivity
                    };
                }
                total.rows = n * selectivity;
                total
            }
            Plan::Union {
                children,
                dedup_key,
                ..
            } => {
                let n = self.table_rows(snapshot);
                let mut total = Estimate::default();
                let mut rows = Vec::with_capacity(children.len());
                for child in children {
                    let e = self.estimate_node(child, snapshot);
                    total.io += e.io;
                    total.cpu += e.cpu;
                    rows.push(e.rows);
                }
                let sum: f64 = rows.iter().sum();
                let largest = rows.iter().copied().fold(0.0, f64::max);
                total.rows = if dedup_key.is_some() && n > 0.0 {
                    let mut overlap = 0.0;
                    for (i, a) in rows.iter().enumerate() {
                        for b in &rows[i + 1..] {
                            overlap += a * b / n;
                        }
                    }
                    (sum - overlap).max(largest).min(n.max(largest))
                } else {
                    sum
                };
                total.cpu += total.rows * c.cpu_row_cost;
                total
            }
            Plan::InJoin {
                field,
                values,
                index,
                ..
            } => {
                let n = self.table_rows(snapshot);
                let unique_key = snapshot.has_table_stats() && index.unique && index.key_fields.len() == 1;
                let mut total = Estimate::default();
                for value in values {
                    let rows = if unique_key {
                        1.0
                    } else {
                        n * self.equality_selectivity(field, value, snapshot)
                    };
                    total.io += c.index_seek_cost + rows * (c.index_row_cost + c.fetch_cost);
                    total.rows += rows;
                }
                total.cpu = total.rows * c.cpu_row_cost;
                total
            }
            Plan::Filter { child, residual } => {
                let e = self.estimate_node(child, snapshot);
                Estimate {
                    io: e.io,
                    cpu: e.cpu + e.rows * c.predicate_cost,
                    rows: e.rows * self.selectivity(residual, snapshot),
                }
            }
            Plan::Limit { child, limit } => {
                let e = self.estimate_node(child, snapshot);
                if e.rows <= 0.0 {
                    return Estimate::default();
                }
                let fraction = (*limit as f64 / e.rows).min(1.0);
                Estimate {
                    io: e.io * fraction,
                    cpu: e.cpu * fraction,
                    rows: e.rows.min(*limit as f64),
                }
            }
        }
    }

    fn scan_rows(&self, scan: &IndexScanPlan, snapshot: &StatisticsSnapshot) -> f64 {
        let n = self.table_rows(snapshot);
        match &scan.bounds {
            ScanBounds::Rank { start, end } => {
                let end = end.map_or(n, |e| (e as f64).min(n));
                (end - (*start as f64).min(n)).max(0.0)
            }
            ScanBounds::Value(range) => {
                let key = &scan.index.key_fields;
                if scan.index.unique && range.prefix.len() == key.len() && !range.has_range() {
                    return 1.0;
                }
                let mut selectivity: f64 = key
                    .iter()
                    .zip(&range.prefix)
                    .map(|(field, value)| self.equality_selectivity(field, value, snapshot))
                    .product();
                if range.has_range() {
                    if let Some(field) = key.get(range.prefix.len()) {
                        selectivity *= self.range_selectivity(
                            field,
                            range.lower.as_ref(),
                            range.upper.as_ref(),
                            snapshot,
                        );
                    }
                }
                n * selectivity
            }
        }
    }

    fn equality_selectivity(&self, field: &str, value: &Value, snapshot: &StatisticsSnapshot) -> f64 {
        if let Some(histogram) = snapshot.field_histogram(field) {
            return histogram.equality_selectivity(value);
        }
        match snapshot.distinct(field) {
            Some(d) if d > 0 => 1.0 / d as f64,
            _ => self.constants.default_equality_selectivity,
        }
    }

    fn range_selectivity(
        &self,
        field: &str,
        lower: Bound<&Value>,
        upper: Bound<&Value>,
        snapshot: &StatisticsSnapshot,
    ) -> f64 {
        snapshot
            .field_histogram(field)
            .map_or(self.constants.default_range_selectivity, |h| {
                h.range_selectivity(lower, upper)
            })
    }

    /// Estimated fraction of records matching `filter`
    pub fn selectivity(&self, filter: &Filter, snapshot: &StatisticsSnapshot) -> f64 {
        let s = match filter {
            Filter::Comparison { field, op, value } => match op {
                ComparisonOp::Equals => self.equality_selectivity(field, value, snapshot),
                ComparisonOp::NotEquals => 1.0 - self.equality_selectivity(field, value, snapshot),
                ComparisonOp::LessThan => {
                    self.range_selectivity(field, Bound::Unbounded, Bound::Excluded(value), snapshot)
                }
                ComparisonOp::LessThanOrEquals => {
                    self.range_selectivity(field, Bound::Unbounded, Bound::Included(value), snapshot)
                }
                ComparisonOp::GreaterThan => {
                    self.range_selectivity(field, Bound::Excluded(value), Bound::Unbounded, snapshot)
                }
                ComparisonOp::GreaterThanOrEquals => {
                    self.range_selectivity(field, Bound::Included(value), Bound::Unbounded, snapshot)
                }
            },
            Filter::InList { field, values } => values
                .iter()
                .map(|v| self.equality_selectivity(field, v, snapshot))
                .sum(),
            Filter::Rank { op, rank, .. } => self.rank_selectivity(*op, *rank, snapshot),
            Filter::Not(child) => 1.0 - self.selectivity(child, snapshot),
            Filter::And(children) => children.iter().map(|c| self.selectivity(c, snapshot)).product(),
            Filter::Or(children) => {
                1.0 - children
                    .iter()
                    .map(|c| 1.0 - self.selectivity(c, snapshot))
                    .product::<f64>()
            }
        };
        s.clamp(0.0, 1.0)
    }

    fn rank_selectivity(&self, op: ComparisonOp, rank: u64, snapshot: &StatisticsSnapshot) -> f64 {
        let Some(n) = snapshot.row_count().filter(|n| *n > 0).map(|n| n as f64) else {
            return match op {
                ComparisonOp::Equals => self.constants.default_equality_selectivity,
                ComparisonOp::NotEquals => 1.0 - self.constants.default_equality_selectivity,
                _ => self.constants.default_range_selectivity,
            };
        };
        let r = rank as f64;
        match op {
            ComparisonOp::Equals => 1.0 / n,
            ComparisonOp::NotEquals => 1.0 - 1.0 / n,
            ComparisonOp::LessThan => r / n,
            ComparisonOp::LessThanOrEquals => (r + 1.0) / n,
            ComparisonOp::GreaterThan => 1.0 - (r + 1.0) / n,
            ComparisonOp::GreaterThanOrEquals => 1.0 - r / n,
        }
    }
}
