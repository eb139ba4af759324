//! Field values used by records, filters, index keys and histograms.
//!
//! Values form a closed tagged union with an explicit total order across
//! tags, so any two values are comparable without runtime casts:
//!
//! Null < Bool < Int < Double < String
//!
//! There is no numeric coercion between `Int` and `Double`.

mod value;

pub use value::{Value, ValueTag};
