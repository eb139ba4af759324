//! Physical plan tree
//!
//! Plans are immutable values produced by the generator, scored by the
//! cost model and turned into cursors by the executor.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::filter::{ComparisonOp, Filter};
use crate::schema::{IndexDescriptor, RecordType};
use crate::storage::KeyRange;
use crate::value::Value;

/// What part of an index a scan reads.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanBounds {
    /// Equality prefix plus an optional range on the next key field
    Value(KeyRange),
    /// Half-open window `[start, end)` of competition ranks
    Rank { start: u64, end: Option<u64> },
}

impl ScanBounds {
    /// Rank window admitting exactly the ranks `op rank` admits.
    ///
    /// `NotEquals` has no single window and yields `None`.
    pub fn rank_window(op: ComparisonOp, rank: u64) -> Option<(u64, Option<u64>)> {
        match op {
            ComparisonOp::Equals => Some((rank, Some(rank.saturating_add(1)))),
            ComparisonOp::LessThan => Some((0, Some(rank))),
            ComparisonOp::LessThanOrEquals => Some((0, Some(rank.saturating_add(1)))),
            ComparisonOp::GreaterThan => Some((rank.saturating_add(1), None)),
            ComparisonOp::GreaterThanOrEquals => Some((rank, None)),
            ComparisonOp::NotEquals => None,
        }
    }

    /// Whether a rank window can hold no rank at all
    pub fn is_empty_window(&self) -> bool {
        matches!(self, ScanBounds::Rank { start, end: Some(end) } if start >= end)
    }
}

/// Scan over one index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexScanPlan {
    pub index: Arc<IndexDescriptor>,
    pub bounds: ScanBounds,
    /// Emit the stored index fields without fetching the record
    pub covering: bool,
    /// Conjuncts the bounds enforce exactly
    pub matched: Vec<Filter>,
}

impl IndexScanPlan {
    /// Number of key fields bound by equality
    pub fn equality_prefix_len(&self) -> usize {
        match &self.bounds {
            ScanBounds::Value(range) => range.prefix.len(),
            ScanBounds::Rank { .. } => 0,
        }
    }

    pub fn is_rank_scan(&self) -> bool {
        matches!(self.bounds, ScanBounds::Rank { .. })
    }
}

/// A physical query plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    FullScan {
        record_type: String,
    },
    IndexScan(IndexScanPlan),
    /// Records of any child. `merge_key` present means every child is
    /// ordered on it and the union merges; otherwise children are drained
    /// in turn.
    Union {
        children: Vec<Plan>,
        dedup_key: Option<String>,
        merge_key: Option<Vec<String>>,
    },
    /// Records of every child. Without a merge key the first child drives
    /// and the others are probed by their exact filters.
    Intersection {
        children: Vec<Plan>,
        merge_key: Option<Vec<String>>,
    },
    /// One equality lookup per value, in ascending value order
    InJoin {
        field: String,
        values: Vec<Value>,
        index: Arc<IndexDescriptor>,
        batch_size: usize,
    },
    Filter {
        child: Box<Plan>,
        residual: Filter,
    },
    Limit {
        child: Box<Plan>,
        limit: usize,
    },
}

/// Output order of a plan.
///
/// Records come out sorted by `fields`. Fields in `constants` hold one
/// value across the whole output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOrdering {
    pub fields: Vec<String>,
    pub constants: BTreeSet<String>,
}

impl PlanOrdering {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            constants: BTreeSet::new(),
        }
    }

    /// Whether output in this ordering is also sorted by `target`
    pub fn satisfies(&self, target: &[String]) -> bool {
        let wanted: Vec<&String> = target.iter().filter(|f| !self.constants.contains(*f)).collect();
        let have: Vec<&String> = self.fields.iter().filter(|f| !self.constants.contains(*f)).collect();
        have.len() >= wanted.len() && have[..wanted.len()] == wanted[..]
    }
}

/// Merge key every ordering satisfies, if any.
///
/// Tries the primary key first, then each child's own ordering.
pub fn shared_merge_key(orderings: &[Option<PlanOrdering>], primary_key: &str) -> Option<Vec<String>> {
    let orderings: Vec<&PlanOrdering> = orderings.iter().map(Option::as_ref).collect::<Option<Vec<_>>>()?;
    let mut targets = vec![vec![primary_key.to_string()]];
    targets.extend(orderings.iter().map(|o| o.fields.clone()));
    targets
        .into_iter()
        .filter(|t| t.last().map(String::as_str) == Some(primary_key))
        .find(|t| orderings.iter().all(|o| o.satisfies(t)))
}

impl Plan {
    /// Full scan of a record type
    pub fn full_scan(record_type: impl Into<String>) -> Self {
        Plan::FullScan {
            record_type: record_type.into(),
        }
    }

    /// Wrap in a residual filter unless the residual is trivially true
    pub fn with_residual(self, residual: Filter) -> Self {
        if residual.is_always() {
            self
        } else {
            Plan::Filter {
                child: Box::new(self),
                residual,
            }
        }
    }

    pub fn with_limit(self, limit: Option<usize>) -> Self {
        match limit {
            Some(limit) => Plan::Limit {
                child: Box::new(self),
                limit,
            },
            None => self,
        }
    }

    /// Name of this node
    pub fn node_name(&self) -> &'static str {
        match self {
            Plan::FullScan { .. } => "FullScan",
            Plan::IndexScan(scan) if scan.is_rank_scan() => "RankScan",
            Plan::IndexScan(_) => "IndexScan",
            Plan::Union { .. } => "Union",
            Plan::Intersection { .. } => "Intersection",
            Plan::InJoin { .. } => "InJoin",
            Plan::Filter { .. } => "Filter",
            Plan::Limit { .. } => "Limit",
        }
    }

    /// Name of the access path under any filter and limit wrappers
    pub fn plan_type(&self) -> &'static str {
        self.access_path().node_name()
    }

    /// The node under any filter and limit wrappers
    pub fn access_path(&self) -> &Plan {
        match self {
            Plan::Filter { child, .. } | Plan::Limit { child, .. } => child.access_path(),
            other => other,
        }
    }

    /// Scans the access path opens; an IN-join opens one per value
    pub fn scan_count(&self) -> usize {
        match self {
            Plan::FullScan { .. } | Plan::IndexScan(_) => 1,
            Plan::InJoin { values, .. } => values.len().max(1),
            Plan::Union { children, .. } | Plan::Intersection { children, .. } => {
                children.iter().map(Plan::scan_count).sum()
            }
            Plan::Filter { child, .. } | Plan::Limit { child, .. } => child.scan_count(),
        }
    }

    /// Index of the leftmost scan in the tree
    pub fn first_index_name(&self) -> Option<&str> {
        match self {
            Plan::FullScan { .. } => None,
            Plan::IndexScan(scan) => Some(&scan.index.name),
            Plan::InJoin { index, .. } => Some(&index.name),
            Plan::Union { children, .. } | Plan::Intersection { children, .. } => {
                children.iter().find_map(Plan::first_index_name)
            }
            Plan::Filter { child, .. } | Plan::Limit { child, .. } => child.first_index_name(),
        }
    }

    /// Whether the plan reads every record of the type
    pub fn uses_full_scan(&self) -> bool {
        match self {
            Plan::FullScan { .. } => true,
            Plan::IndexScan(_) | Plan::InJoin { .. } => false,
            Plan::Union { children, .. } => children.iter().any(Plan::uses_full_scan),
            Plan::Intersection { children, .. } => children.first().map_or(false, Plan::uses_full_scan),
            Plan::Filter { child, .. } | Plan::Limit { child, .. } => child.uses_full_scan(),
        }
    }

    /// The filter the plan's output satisfies exactly, ignoring limits
    pub fn matching_filter(&self) -> Filter {
        match self {
            Plan::FullScan { .. } => Filter::always(),
            Plan::IndexScan(scan) => match scan.matched.as_slice() {
                [single] => single.clone(),
                many => Filter::and(many.iter().cloned()),
            },
            Plan::Union { children, .. } => Filter::or(children.iter().map(Plan::matching_filter)),
            Plan::Intersection { children, .. } => Filter::and(children.iter().map(Plan::matching_filter)),
            Plan::InJoin { field, values, .. } => Filter::InList {
                field: field.clone(),
                values: values.clone(),
            },
            Plan::Filter { child, residual } => {
                let inner = child.matching_filter();
                if inner.is_always() {
                    residual.clone()
                } else {
                    Filter::and([inner, residual.clone()])
                }
            }
            Plan::Limit { child, .. } => child.matching_filter(),
        }
    }

    /// Output ordering, or `None` when the output is unordered
    pub fn ordering(&self, record_type: &RecordType) -> Option<PlanOrdering> {
        let pk = record_type.primary_key_field();
        let with_pk = |mut fields: Vec<String>| {
            if fields.last().map(String::as_str) != Some(pk) {
                fields.retain(|f| f != pk);
                fields.push(pk.to_string());
            }
            fields
        };
        match self {
            Plan::FullScan { .. } => Some(PlanOrdering::new(vec![pk.to_string()])),
            Plan::IndexScan(scan) => {
                let bound = scan.equality_prefix_len();
                let key = &scan.index.key_fields;
                Some(PlanOrdering {
                    fields: with_pk(key[bound.min(key.len())..].to_vec()),
                    constants: key[..bound.min(key.len())].iter().cloned().collect(),
                })
            }
            Plan::InJoin { index, .. } => Some(PlanOrdering::new(with_pk(index.key_fields.clone()))),
            Plan::Union { merge_key, .. } => merge_key.clone().map(PlanOrdering::new),
            Plan::Intersection { children, merge_key } => match merge_key {
                Some(key) => Some(PlanOrdering::new(key.clone())),
                None => children.first().and_then(|c| c.ordering(record_type)),
            },
            Plan::Filter { child, .. } | Plan::Limit { child, .. } => child.ordering(record_type),
        }
    }

    /// Deterministic multi-line description, two spaces per level
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = match self {
            Plan::FullScan { record_type } => writeln!(out, "{}FullScan({})", indent, record_type),
            Plan::IndexScan(scan) => {
                let covering = if scan.covering { ", covering" } else { "" };
                match &scan.bounds {
                    ScanBounds::Value(range) => {
                        writeln!(out, "{}IndexScan({}, {}{})", indent, scan.index.name, range, covering)
                    }
                    ScanBounds::Rank { start, end } => {
                        let end = end.map_or_else(|| "end".to_string(), |e| e.to_string());
                        writeln!(out, "{}RankScan({}, [{}, {}){})", indent, scan.index.name, start, end, covering)
                    }
                }
            }
            Plan::Union {
                dedup_key,
                merge_key,
                ..
            } => {
                let mut parts = Vec::new();
                if let Some(key) = dedup_key {
                    parts.push(format!("dedup={}", key));
                }
                match merge_key {
                    Some(key) => parts.push(format!("merge=[{}]", key.join(", "))),
                    None => parts.push("unordered".to_string()),
                }
                writeln!(out, "{}Union({})", indent, parts.join(", "))
            }
            Plan::Intersection { merge_key, .. } => match merge_key {
                Some(key) => writeln!(out, "{}Intersection(merge=[{}])", indent, key.join(", ")),
                None => writeln!(out, "{}Intersection(probe)", indent),
            },
            Plan::InJoin {
                field,
                values,
                index,
                batch_size,
            } => writeln!(
                out,
                "{}InJoin({}, {} values, {}, batch={})",
                indent,
                field,
                values.len(),
                index.name,
                batch_size
            ),
            Plan::Filter { residual, .. } => writeln!(out, "{}Filter({})", indent, residual),
            Plan::Limit { limit, .. } => writeln!(out, "{}Limit({})", indent, limit),
        };
        match self {
            Plan::Union { children, .. } | Plan::Intersection { children, .. } => {
                for child in children {
                    child.explain_into(out, depth + 1);
                }
            }
            Plan::Filter { child, .. } | Plan::Limit { child, .. } => child.explain_into(out, depth + 1),
            _ => {}
        }
    }
}
