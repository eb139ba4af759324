//! Filter tree
//!
//! Filters are immutable values. Rewriting produces new trees.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
}

impl ComparisonOp {
    /// Operator matching exactly the values this one rejects.
    ///
    /// Exact because comparisons are two-valued over a total order.
    pub fn negate(&self) -> Self {
        match self {
            ComparisonOp::Equals => ComparisonOp::NotEquals,
            ComparisonOp::NotEquals => ComparisonOp::Equals,
            ComparisonOp::LessThan => ComparisonOp::GreaterThanOrEquals,
            ComparisonOp::LessThanOrEquals => ComparisonOp::GreaterThan,
            ComparisonOp::GreaterThan => ComparisonOp::LessThanOrEquals,
            ComparisonOp::GreaterThanOrEquals => ComparisonOp::LessThan,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Equals => "=",
            ComparisonOp::NotEquals => "!=",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessThanOrEquals => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterThanOrEquals => ">=",
        }
    }

    /// Whether the operator bounds values from below
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, ComparisonOp::GreaterThan | ComparisonOp::GreaterThanOrEquals)
    }

    /// Whether the operator bounds values from above
    pub fn is_upper_bound(&self) -> bool {
        matches!(self, ComparisonOp::LessThan | ComparisonOp::LessThanOrEquals)
    }

    /// Apply the operator to `actual` compared against `expected`
    pub fn test<T: Ord + ?Sized>(&self, actual: &T, expected: &T) -> bool {
        match self {
            ComparisonOp::Equals => actual == expected,
            ComparisonOp::NotEquals => actual != expected,
            ComparisonOp::LessThan => actual < expected,
            ComparisonOp::LessThanOrEquals => actual <= expected,
            ComparisonOp::GreaterThan => actual > expected,
            ComparisonOp::GreaterThanOrEquals => actual >= expected,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Boolean filter over one record.
///
/// An empty `And` matches everything; an empty `Or` matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Comparison {
        field: String,
        op: ComparisonOp,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    InList {
        field: String,
        values: Vec<Value>,
    },
    /// Compares the competition rank of the field's value within the
    /// field's rank index: the number of indexed values strictly less.
    Rank {
        field: String,
        op: ComparisonOp,
        rank: u64,
    },
}

impl Filter {
    pub fn compare(field: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Filter::Comparison {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Equals, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::NotEquals, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::LessThan, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::LessThanOrEquals, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::GreaterThan, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::GreaterThanOrEquals, value)
    }

    pub fn and(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(children.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Filter) -> Self {
        Filter::Not(Box::new(child))
    }

    pub fn in_list(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Filter::InList {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rank(field: impl Into<String>, op: ComparisonOp, rank: u64) -> Self {
        Filter::Rank {
            field: field.into(),
            op,
            rank,
        }
    }

    /// Matches every record
    pub fn always() -> Self {
        Filter::And(Vec::new())
    }

    /// Matches no record
    pub fn never() -> Self {
        Filter::Or(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Filter::And(c) if c.is_empty())
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Filter::Or(c) if c.is_empty())
    }

    /// Whether this node has no filter children
    pub fn is_leaf(&self) -> bool {
        match self {
            Filter::Comparison { .. } | Filter::InList { .. } | Filter::Rank { .. } => true,
            Filter::Not(child) => child.is_leaf(),
            Filter::And(_) | Filter::Or(_) => false,
        }
    }

    /// Nesting depth; a leaf has depth 1
    pub fn depth(&self) -> usize {
        // explicit stack: runs before any recursive pass over the tree
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((node, level)) = pending.pop() {
            deepest = deepest.max(level);
            match node {
                Filter::Comparison { .. } | Filter::InList { .. } | Filter::Rank { .. } => {}
                Filter::Not(child) => pending.push((child.as_ref(), level + 1)),
                Filter::And(children) | Filter::Or(children) => {
                    pending.extend(children.iter().map(|c| (c, level + 1)));
                }
            }
        }
        deepest
    }

    /// Top-level conjuncts: the children of an `And`, otherwise the filter itself
    pub fn conjuncts(&self) -> &[Filter] {
        match self {
            Filter::And(children) => children,
            other => std::slice::from_ref(other),
        }
    }

    /// Field referenced by a leaf
    pub fn leaf_field(&self) -> Option<&str> {
        match self {
            Filter::Comparison { field, .. }
            | Filter::InList { field, .. }
            | Filter::Rank { field, .. } => Some(field),
            Filter::Not(child) => child.leaf_field(),
            Filter::And(_) | Filter::Or(_) => None,
        }
    }

    /// Every field referenced anywhere in the tree
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Filter::Comparison { field, .. }
            | Filter::InList { field, .. }
            | Filter::Rank { field, .. } => {
                out.insert(field);
            }
            Filter::Not(child) => child.collect_fields(out),
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }

    /// Fields used by `Rank` leaves
    pub fn rank_fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.visit(&mut |f| {
            if let Filter::Rank { field, .. } = f {
                out.insert(field.as_str());
            }
        });
        out
    }

    /// Pre-order walk over every node
    pub fn visit<'a, F: FnMut(&'a Filter)>(&'a self, f: &mut F) {
        f(self);
        match self {
            Filter::Not(child) => child.visit(f),
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.visit(f);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Comparison { field, op, value } => write!(f, "{} {} {}", field, op, value),
            Filter::InList { field, values } => {
                write!(f, "{} IN (", field)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Filter::Rank { field, op, rank } => write!(f, "rank({}) {} {}", field, op, rank),
            Filter::Not(child) => write!(f, "NOT ({})", child),
            Filter::And(children) if children.is_empty() => write!(f, "TRUE"),
            Filter::Or(children) if children.is_empty() => write!(f, "FALSE"),
            Filter::And(children) | Filter::Or(children) => {
                let joiner = if matches!(self, Filter::And(_)) { " AND " } else { " OR " };
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    if child.is_leaf() {
                        write!(f, "{}", child)?;
                    } else {
                        write!(f, "({})", child)?;
                    }
                }
                Ok(())
            }
        }
    }
}
