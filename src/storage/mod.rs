//! Record store interface and the in-memory reference store
//!
//! The planner and cursors read through [`RecordStore`]; writes go through
//! [`StoreTransaction`]. Every read carries a [`ReadConsistency`].
//!
//! [`MemoryStore`] keeps records in primary-key order, one ordered entry
//! set per value index, and one [`RankedSet`](crate::rank::RankedSet) per
//! rank index. All of them are maintained on every save and delete inside
//! the transaction.

mod errors;
mod memory;
mod store;

pub use errors::{StoreError, StoreResult};
pub use memory::{MemorySnapshot, MemoryStore, MemoryTransaction};
pub use store::{
    IndexEntry, IndexEntryIter, KeyRange, ReadConsistency, RecordIter, RecordStore,
    StoreTransaction,
};
