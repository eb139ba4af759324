//! Cost model
//!
//! Maps a plan and a [`StatisticsSnapshot`](crate::stats::StatisticsSnapshot)
//! to a [`QueryCost`]. The model never fails: missing or rejected
//! statistics fall back to the defaults in [`CostConstants`].
//!
//! Intersections use the conservative model: child selectivities
//! multiply, child I/O and CPU add up.

mod constants;
mod model;

pub use constants::CostConstants;
pub use model::{CostModel, QueryCost, CPU_WEIGHT};
