//! Candidate plan generation
//!
//! Enumerates plans for a rewritten filter:
//!
//! - full scan plus residual, when allowed (always first)
//! - unique-index point lookup, which short-circuits everything else
//! - one scan per index whose key prefix matches top-level conjuncts
//! - IN-joins over top-level IN lists
//! - an intersection of scans over disjoint conjuncts
//! - unions over OR conjuncts and over the DNF form
//!
//! Union branches are planned recursively; each takes its cheapest
//! index-based plan.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use super::config::PlannerConfig;
use super::plan::{shared_merge_key, IndexScanPlan, Plan, ScanBounds};
use super::query::Query;
use crate::cost::{CostModel, QueryCost};
use crate::filter::{ComparisonOp, Filter};
use crate::observability::{Event, Logger};
use crate::rewriter::Rewritten;
use crate::schema::{IndexCatalog, IndexDescriptor, RecordType};
use crate::stats::StatisticsSnapshot;
use crate::storage::KeyRange;
use crate::value::Value;

/// Totals within this fraction of each other are a near tie, settled in
/// favor of the plan opening fewer scans
const COST_TIE_RATIO: f64 = 0.05;

/// An index scan and the conjuncts it consumes
#[derive(Debug, Clone)]
struct IndexMatch {
    scan: IndexScanPlan,
    used: BTreeSet<usize>,
}

/// Builds candidate plans for one query.
pub struct CandidateGenerator<'a> {
    catalog: &'a dyn IndexCatalog,
    record_type: &'a RecordType,
    indexes: Vec<Arc<IndexDescriptor>>,
    snapshot: &'a StatisticsSnapshot,
    cost: &'a CostModel,
    config: &'a PlannerConfig,
    logger: &'a Logger,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(
        catalog: &'a dyn IndexCatalog,
        record_type: &'a RecordType,
        snapshot: &'a StatisticsSnapshot,
        cost: &'a CostModel,
        config: &'a PlannerConfig,
        logger: &'a Logger,
    ) -> Self {
        let indexes = catalog
            .indexes(record_type.name())
            .into_iter()
            .filter(|idx| idx.is_plannable())
            .collect();
        Self {
            catalog,
            record_type,
            indexes,
            snapshot,
            cost,
            config,
            logger,
        }
    }

    /// Candidate plans, at most `max_candidate_plans`, each under the
    /// query's limit
    pub fn generate(&self, rewritten: &Rewritten, query: &Query) -> Vec<Plan> {
        let filter = &rewritten.filter;
        let required = query.required_fields.as_deref();

        if let Some(point) = self.unique_candidate(filter, required) {
            return vec![point.with_limit(query.limit)];
        }

        let mut out = Vec::new();
        if self.config.allow_full_scan {
            out.push(Plan::full_scan(self.record_type.name()).with_residual(filter.clone()));
        }
        self.index_candidates(filter, required, true, &mut out);
        if let Some(Filter::Or(terms)) = &rewritten.dnf {
            if let Some(union) = self.union_plan(terms) {
                out.push(union);
            }
        }

        let mut distinct: Vec<Plan> = Vec::with_capacity(out.len());
        for plan in out {
            if !distinct.contains(&plan) {
                distinct.push(plan);
            }
        }
        distinct
            .into_iter()
            .take(self.config.max_candidate_plans)
            .map(|plan| plan.with_limit(query.limit))
            .collect()
    }

    /// Every index-based plan for `filter`
    fn index_candidates(&self, filter: &Filter, required: Option<&[String]>, top_level: bool, out: &mut Vec<Plan>) {
        let conjuncts = filter.conjuncts();
        let matches: Vec<IndexMatch> = self
            .indexes
            .iter()
            .filter_map(|idx| self.match_index(idx, conjuncts))
            .collect();

        for m in &matches {
            out.push(self.scan_candidate(m, conjuncts, required));
        }
        self.in_join_candidates(conjuncts, top_level, out);
        if let Some(intersection) = self.intersection_candidate(&matches, conjuncts) {
            out.push(intersection);
        }
        for (i, conjunct) in conjuncts.iter().enumerate() {
            if let Filter::Or(branches) = conjunct {
                if let Some(union) = self.union_plan(branches) {
                    out.push(union.with_residual(residual_of(conjuncts, &BTreeSet::from([i]))));
                }
            }
        }
    }

    /// Point lookup on a unique index with every key field bound by equality
    fn unique_candidate(&self, filter: &Filter, required: Option<&[String]>) -> Option<Plan> {
        let conjuncts = filter.conjuncts();
        self.indexes
            .iter()
            .filter(|idx| self.catalog.is_unique(idx))
            .filter_map(|idx| self.match_value(idx, conjuncts))
            .find(|m| match &m.scan.bounds {
                ScanBounds::Value(range) => {
                    range.prefix.len() == m.scan.index.key_fields.len() && !range.has_range()
                }
                ScanBounds::Rank { .. } => false,
            })
            .map(|m| self.scan_candidate(&m, conjuncts, required))
    }

    fn match_index(&self, index: &Arc<IndexDescriptor>, conjuncts: &[Filter]) -> Option<IndexMatch> {
        if index.is_rank() {
            if let Some(m) = self.match_rank(index, conjuncts) {
                return Some(m);
            }
        }
        self.match_value(index, conjuncts)
    }

    /// Equality run over the key prefix, then at most one lower and one
    /// upper bound on the next key field
    fn match_value(&self, index: &Arc<IndexDescriptor>, conjuncts: &[Filter]) -> Option<IndexMatch> {
        let mut used = BTreeSet::new();
        let mut prefix = Vec::new();
        let mut lower = Bound::Unbounded;
        let mut upper = Bound::Unbounded;

        for field in &index.key_fields {
            if let Some((i, value)) = find_comparison(conjuncts, &used, field, |op| op == ComparisonOp::Equals) {
                prefix.push(value.clone());
                used.insert(i);
                continue;
            }
            if let Some((i, value)) = find_comparison(conjuncts, &used, field, |op| op.is_lower_bound()) {
                lower = bound_for(conjuncts[i].clone(), value);
                used.insert(i);
            }
            if let Some((i, value)) = find_comparison(conjuncts, &used, field, |op| op.is_upper_bound()) {
                upper = bound_for(conjuncts[i].clone(), value);
                used.insert(i);
            }
            break;
        }
        if used.is_empty() {
            return None;
        }
        Some(IndexMatch {
            scan: IndexScanPlan {
                index: Arc::clone(index),
                bounds: ScanBounds::Value(KeyRange::between(prefix, lower, upper)),
                covering: false,
                matched: used.iter().map(|i| conjuncts[*i].clone()).collect(),
            },
            used,
        })
    }

    /// Rank leaves on the index field, intersected into one window
    fn match_rank(&self, index: &Arc<IndexDescriptor>, conjuncts: &[Filter]) -> Option<IndexMatch> {
        let field = index.leading_field()?;
        let mut used = BTreeSet::new();
        let mut start = 0u64;
        let mut end: Option<u64> = None;

        for (i, conjunct) in conjuncts.iter().enumerate() {
            let Filter::Rank { field: f, op, rank } = conjunct else {
                continue;
            };
            if f != field {
                continue;
            }
            if let Some((s, e)) = ScanBounds::rank_window(*op, *rank) {
                start = start.max(s);
                end = match (end, e) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                used.insert(i);
            }
        }
        if used.is_empty() {
            return None;
        }
        Some(IndexMatch {
            scan: IndexScanPlan {
                index: Arc::clone(index),
                bounds: ScanBounds::Rank { start, end },
                covering: false,
                matched: used.iter().map(|i| conjuncts[*i].clone()).collect(),
            },
            used,
        })
    }

    fn scan_candidate(&self, m: &IndexMatch, conjuncts: &[Filter], required: Option<&[String]>) -> Plan {
        let residual = residual_of(conjuncts, &m.used);
        let mut scan = m.scan.clone();
        scan.covering = self.is_covering(&scan.index, &residual, required);
        Plan::IndexScan(scan).with_residual(residual)
    }

    /// Whether the index entry carries every field the query reads
    fn is_covering(&self, index: &IndexDescriptor, residual: &Filter, required: Option<&[String]>) -> bool {
        let Some(required) = required else {
            return false;
        };
        let pk = self.record_type.primary_key_field();
        let stored = |f: &str| f == pk || index.stores_field(f);
        required.iter().all(|f| stored(f)) && residual.fields().into_iter().all(stored)
    }

    fn in_join_candidates(&self, conjuncts: &[Filter], log_skips: bool, out: &mut Vec<Plan>) {
        for (i, conjunct) in conjuncts.iter().enumerate() {
            let Filter::InList { field, values } = conjunct else {
                continue;
            };
            let mut values = values.clone();
            values.sort();
            values.dedup();
            if values.len() < 2 {
                continue;
            }
            let Some(index) = self
                .catalog
                .indexes_for_field(self.record_type.name(), field)
                .into_iter()
                .find(|idx| idx.is_plannable())
            else {
                continue;
            };
            if values.len() > self.config.max_in_values {
                if log_skips {
                    self.logger.event(
                        Event::InListTooLong,
                        &[
                            ("field", field),
                            ("values", &values.len().to_string()),
                            ("max_in_values", &self.config.max_in_values.to_string()),
                        ],
                    );
                }
                continue;
            }
            let plan = Plan::InJoin {
                field: field.clone(),
                values,
                index,
                batch_size: self.config.in_join_batch_size,
            };
            out.push(plan.with_residual(residual_of(conjuncts, &BTreeSet::from([i]))));
        }
    }

    /// Scans over disjoint conjuncts, smallest estimate first
    fn intersection_candidate(&self, matches: &[IndexMatch], conjuncts: &[Filter]) -> Option<Plan> {
        let mut ranked: Vec<(i64, &IndexMatch)> = matches
            .iter()
            .filter(|m| !m.scan.bounds.is_empty_window())
            .map(|m| {
                let rows = self
                    .cost
                    .estimate(&Plan::IndexScan(m.scan.clone()), self.snapshot)
                    .estimated_rows;
                (rows, m)
            })
            .collect();
        ranked.sort_by_key(|(rows, _)| *rows);

        let mut used = BTreeSet::new();
        let mut children = Vec::new();
        for (_, m) in ranked {
            if m.used.is_disjoint(&used) {
                used.extend(m.used.iter().copied());
                children.push(Plan::IndexScan(m.scan.clone()));
            }
        }
        if children.len() < 2 {
            return None;
        }
        let orderings: Vec<_> = children.iter().map(|c| c.ordering(self.record_type)).collect();
        let merge_key = shared_merge_key(&orderings, self.record_type.primary_key_field());
        Some(Plan::Intersection { children, merge_key }.with_residual(residual_of(conjuncts, &used)))
    }

    /// Union of the cheapest index plan per branch, if every branch has one
    fn union_plan(&self, branches: &[Filter]) -> Option<Plan> {
        if branches.len() < 2 {
            return None;
        }
        let children = branches
            .iter()
            .map(|b| self.best_branch_plan(b))
            .collect::<Option<Vec<_>>>()?;
        let pk = self.record_type.primary_key_field();
        let orderings: Vec<_> = children.iter().map(|c| c.ordering(self.record_type)).collect();
        Some(Plan::Union {
            merge_key: shared_merge_key(&orderings, pk),
            children,
            dedup_key: Some(pk.to_string()),
        })
    }

    fn best_branch_plan(&self, branch: &Filter) -> Option<Plan> {
        if let Some(point) = self.unique_candidate(branch, None) {
            return Some(point);
        }
        let mut candidates = Vec::new();
        self.index_candidates(branch, None, false, &mut candidates);
        candidates.into_iter().min_by(|a, b| self.compare(a, b))
    }

    /// Order by total cost, then estimated rows, then explain text.
    /// Near ties go to the plan with fewer scans.
    pub fn compare(&self, a: &Plan, b: &Plan) -> Ordering {
        let ca = self.cost.estimate(a, self.snapshot);
        let cb = self.cost.estimate(b, self.snapshot);
        compare_costed(a, &ca, b, &cb)
    }
}

fn compare_costed(a: &Plan, ca: &QueryCost, b: &Plan, cb: &QueryCost) -> Ordering {
    let (ta, tb) = (ca.total(), cb.total());
    let by_total = if (ta - tb).abs() <= COST_TIE_RATIO * ta.max(tb) {
        a.scan_count().cmp(&b.scan_count()).then(ta.total_cmp(&tb))
    } else {
        ta.total_cmp(&tb)
    };
    by_total
        .then(ca.estimated_rows.cmp(&cb.estimated_rows))
        .then_with(|| a.explain().cmp(&b.explain()))
}

/// First unused comparison on `field` whose operator passes `accept`
fn find_comparison<'f>(
    conjuncts: &'f [Filter],
    used: &BTreeSet<usize>,
    field: &str,
    accept: impl Fn(ComparisonOp) -> bool,
) -> Option<(usize, &'f Value)> {
    conjuncts.iter().enumerate().find_map(|(i, c)| match c {
        Filter::Comparison { field: f, op, value } if f == field && accept(*op) && !used.contains(&i) => {
            Some((i, value))
        }
        _ => None,
    })
}

fn bound_for(comparison: Filter, value: &Value) -> Bound<Value> {
    match comparison {
        Filter::Comparison {
            op: ComparisonOp::GreaterThan | ComparisonOp::LessThan,
            ..
        } => Bound::Excluded(value.clone()),
        _ => Bound::Included(value.clone()),
    }
}

/// Conjuncts not in `used`, as one filter
fn residual_of(conjuncts: &[Filter], used: &BTreeSet<usize>) -> Filter {
    let mut rest: Vec<Filter> = conjuncts
        .iter()
        .enumerate()
        .filter(|(i, _)| !used.contains(i))
        .map(|(_, c)| c.clone())
        .collect();
    match rest.len() {
        0 => Filter::always(),
        1 => rest.remove(0),
        _ => Filter::And(rest),
    }
}
