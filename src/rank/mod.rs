//! Order-statistics structures backing rank indexes
//!
//! `RankedSet` is a skip list whose links carry spans, giving O(log n)
//! `rank` (how many values sort strictly before a value) and `select`
//! (the value at a rank). Nodes live in an arena addressed by integer
//! index rather than behind shared pointers.

mod ranked_set;

pub use ranked_set::{Iter, RankedSet, RankedSetError, MAX_LEVEL};
