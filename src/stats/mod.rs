//! Statistics store
//!
//! Table statistics and index histograms are produced out of band and
//! read through [`StatisticsSource`]. Before any cost arithmetic the
//! planner fetches everything it needs into an immutable
//! [`StatisticsSnapshot`], validating as it goes. Invalid statistics are
//! dropped there, so the cost model only ever sees consistent inputs.

mod errors;
mod histogram;
mod source;
mod table;

pub use errors::{EstimationError, EstimationResult};
pub use histogram::{Bucket, Histogram};
pub use source::{MemoryStatistics, NoStatistics, StatisticsSnapshot, StatisticsSource};
pub use table::TableStats;
