//! Query filters
//!
//! A filter is a boolean tree over record fields: comparisons, IN lists
//! and rank comparisons combined with AND, OR and NOT. Comparisons use
//! the total order of [`Value`](crate::value::Value), so every predicate
//! is two-valued and a record missing a field compares as `Null`.

mod ast;
mod eval;
mod fingerprint;

pub use ast::{ComparisonOp, Filter};
pub use eval::{rank_index_for, CompiledFilter, RankLookup};
pub use fingerprint::{canonical_text, Fingerprint};
