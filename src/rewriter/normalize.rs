//! Always-safe filter transforms
//!
//! NOT is pushed to the leaves, nested AND/OR nodes are flattened,
//! duplicate children removed, single-child nodes collapsed and IN lists
//! de-duplicated. Empty AND is true and empty OR is false; both fold into
//! their parents.

use std::collections::HashSet;

use crate::filter::{canonical_text, ComparisonOp, Filter};
use crate::value::Value;

/// Normalize a filter. The result matches exactly the same records.
pub fn normalize(filter: &Filter) -> Filter {
    simplify(push_not(filter, false))
}

fn in_list(field: &str, values: &[Value]) -> Filter {
    let mut values = values.to_vec();
    values.sort();
    values.dedup();
    match values.len() {
        0 => Filter::never(),
        1 => Filter::Comparison {
            field: field.to_string(),
            op: ComparisonOp::Equals,
            value: values.remove(0),
        },
        _ => Filter::InList {
            field: field.to_string(),
            values,
        },
    }
}

fn push_not(filter: &Filter, negate: bool) -> Filter {
    match filter {
        Filter::Comparison { field, op, value } => Filter::Comparison {
            field: field.clone(),
            op: if negate { op.negate() } else { *op },
            value: value.clone(),
        },
        Filter::Rank { field, op, rank } => Filter::Rank {
            field: field.clone(),
            op: if negate { op.negate() } else { *op },
            rank: *rank,
        },
        Filter::InList { field, values } => {
            let simplified = in_list(field, values);
            if !negate {
                return simplified;
            }
            match simplified {
                Filter::Comparison { field, op, value } => Filter::Comparison {
                    field,
                    op: op.negate(),
                    value,
                },
                list @ Filter::InList { .. } => Filter::not(list),
                _ => Filter::always(),
            }
        }
        Filter::Not(child) => push_not(child, !negate),
        Filter::And(children) => {
            let children = children.iter().map(|c| push_not(c, negate)).collect();
            if negate {
                Filter::Or(children)
            } else {
                Filter::And(children)
            }
        }
        Filter::Or(children) => {
            let children = children.iter().map(|c| push_not(c, negate)).collect();
            if negate {
                Filter::And(children)
            } else {
                Filter::Or(children)
            }
        }
    }
}

/// Flatten, fold constants, drop duplicates and collapse single children.
pub(crate) fn simplify(filter: Filter) -> Filter {
    match filter {
        Filter::And(children) => simplify_group(children, true),
        Filter::Or(children) => simplify_group(children, false),
        Filter::Not(child) => Filter::Not(Box::new(simplify(*child))),
        leaf => leaf,
    }
}

fn simplify_group(children: Vec<Filter>, conjunction: bool) -> Filter {
    let mut out = Vec::with_capacity(children.len());
    let mut seen = HashSet::new();

    for child in children {
        let child = simplify(child);
        // absorbing constant: FALSE in AND, TRUE in OR
        if (conjunction && child.is_never()) || (!conjunction && child.is_always()) {
            return child;
        }
        let nested = match child {
            Filter::And(inner) if conjunction => inner,
            Filter::Or(inner) if !conjunction => inner,
            other => vec![other],
        };
        for c in nested {
            if seen.insert(canonical_text(&c)) {
                out.push(c);
            }
        }
    }

    if out.len() == 1 {
        return out.remove(0);
    }
    if conjunction {
        Filter::And(out)
    } else {
        Filter::Or(out)
    }
}
