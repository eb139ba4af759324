//! Bounded disjunctive normal form

use crate::filter::Filter;

use super::normalize::simplify;

/// Number of DNF terms the filter would expand into.
///
/// Products over AND children, sums over OR children, one per leaf.
/// Saturates instead of overflowing.
pub fn estimate_terms(filter: &Filter) -> usize {
    match filter {
        Filter::And(children) => children
            .iter()
            .fold(1usize, |acc, c| acc.saturating_mul(estimate_terms(c))),
        Filter::Or(children) => children
            .iter()
            .fold(0usize, |acc, c| acc.saturating_add(estimate_terms(c))),
        _ => 1,
    }
}

fn terms(filter: &Filter) -> Vec<Vec<Filter>> {
    match filter {
        Filter::Or(children) => children.iter().flat_map(terms).collect(),
        Filter::And(children) => {
            let mut acc: Vec<Vec<Filter>> = vec![Vec::new()];
            for child in children {
                let child_terms = terms(child);
                let mut next = Vec::with_capacity(acc.len() * child_terms.len());
                for prefix in &acc {
                    for term in &child_terms {
                        let mut combined = prefix.clone();
                        combined.extend(term.iter().cloned());
                        next.push(combined);
                    }
                }
                acc = next;
            }
            acc
        }
        leaf => vec![vec![leaf.clone()]],
    }
}

/// Expand a normalized filter into an OR of ANDs of leaves.
///
/// Returns `None` without expanding when the term estimate exceeds
/// `max_terms`.
pub fn to_dnf(filter: &Filter, max_terms: usize) -> Option<Filter> {
    if estimate_terms(filter) > max_terms {
        return None;
    }
    let expanded = Filter::Or(terms(filter).into_iter().map(Filter::And).collect());
    Some(simplify(expanded))
}
