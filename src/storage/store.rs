//! Store traits and key ranges

use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::errors::StoreResult;
use crate::schema::{IndexDescriptor, Record};
use crate::value::Value;

/// Isolation requested for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConsistency {
    /// Reads join the transaction's conflict set
    #[default]
    Serializable,
    /// Reads see the begin snapshot and never cause conflicts
    Snapshot,
}

/// A contiguous range of index keys.
///
/// Every matching key starts with `prefix`; the key component right after
/// the prefix is constrained by `lower` and `upper`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub prefix: Vec<Value>,
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl KeyRange {
    /// Every key of the index
    pub fn all() -> Self {
        Self {
            prefix: Vec::new(),
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Keys starting with `prefix`
    pub fn prefix(prefix: Vec<Value>) -> Self {
        Self {
            prefix,
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Keys starting with `prefix` whose next component is within bounds
    pub fn between(prefix: Vec<Value>, lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self {
            prefix,
            lower,
            upper,
        }
    }

    /// Whether any bound applies past the prefix
    pub fn has_range(&self) -> bool {
        !matches!(
            (&self.lower, &self.upper),
            (Bound::Unbounded, Bound::Unbounded)
        )
    }

    /// Smallest key that can match. Keys compare lexicographically, so a
    /// shorter key sorts before all of its extensions.
    pub fn start_key(&self) -> Vec<Value> {
        let mut start = self.prefix.clone();
        match &self.lower {
            Bound::Included(v) | Bound::Excluded(v) => start.push(v.clone()),
            Bound::Unbounded => {}
        }
        start
    }

    /// Whether the key lies within the range
    pub fn contains(&self, key: &[Value]) -> bool {
        if !key.starts_with(&self.prefix) {
            return false;
        }
        let Some(next) = key.get(self.prefix.len()) else {
            return !self.has_range();
        };
        let above_lower = match &self.lower {
            Bound::Included(l) => next >= l,
            Bound::Excluded(l) => next > l,
            Bound::Unbounded => true,
        };
        above_lower && !self.exceeds_upper(next)
    }

    /// Whether an ascending scan that reached `key` can stop
    pub fn is_past(&self, key: &[Value]) -> bool {
        if !key.starts_with(&self.prefix) {
            return true;
        }
        key.get(self.prefix.len())
            .map_or(false, |next| self.exceeds_upper(next))
    }

    fn exceeds_upper(&self, next: &Value) -> bool {
        match &self.upper {
            Bound::Included(u) => next > u,
            Bound::Excluded(u) => next >= u,
            Bound::Unbounded => false,
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.prefix.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        if self.has_range() {
            if !self.prefix.is_empty() {
                write!(f, ", ")?;
            }
            match &self.lower {
                Bound::Included(v) => write!(f, ">={}", v)?,
                Bound::Excluded(v) => write!(f, ">{}", v)?,
                Bound::Unbounded => {}
            }
            if !matches!(self.lower, Bound::Unbounded) && !matches!(self.upper, Bound::Unbounded) {
                write!(f, " ")?;
            }
            match &self.upper {
                Bound::Included(v) => write!(f, "<={}", v)?,
                Bound::Excluded(v) => write!(f, "<{}", v)?,
                Bound::Unbounded => {}
            }
        }
        write!(f, "]")
    }
}

/// One index entry produced by an index scan.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Index key values, in key field order
    pub key: Vec<Value>,
    pub primary_key: Value,
    /// Record holding only the fields the index stores; others are `Null`
    pub stored: Record,
}

/// Lazy stream of records
pub type RecordIter<'a> = Box<dyn Iterator<Item = StoreResult<Record>> + 'a>;

/// Lazy stream of index entries in key order
pub type IndexEntryIter<'a> = Box<dyn Iterator<Item = StoreResult<IndexEntry>> + 'a>;

/// Read side of an ordered record store.
///
/// Scans are lazy: nothing is read until the returned iterator is pulled.
pub trait RecordStore: Send + Sync {
    /// All records of a type in primary-key order
    fn scan_records(
        &self,
        record_type: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<RecordIter<'_>>;

    /// Index entries within `range`, in (key, primary key) order
    fn scan_index(
        &self,
        index: &IndexDescriptor,
        range: &KeyRange,
        consistency: ReadConsistency,
    ) -> StoreResult<IndexEntryIter<'_>>;

    /// Point lookup by primary key
    fn load_record(
        &self,
        record_type: &str,
        primary_key: &Value,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<Record>>;

    /// Number of indexed values strictly less than `value`
    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64>;

    /// Indexed value at zero-based `rank`
    fn select_rank(&self, index: &IndexDescriptor, rank: u64) -> StoreResult<Option<Value>>;

    /// Number of indexed values
    fn rank_count(&self, index: &IndexDescriptor) -> StoreResult<u64>;

    /// Read view pinned to one state of the store.
    ///
    /// Every read through the view, rank lookups included, sees that state
    /// no matter what commits later, so an index entry and the record it
    /// names always agree. Executions read through one view for their
    /// whole life.
    fn snapshot(&self) -> Box<dyn RecordStore + '_>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn scan_records(
        &self,
        record_type: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<RecordIter<'_>> {
        (**self).scan_records(record_type, consistency)
    }

    fn scan_index(
        &self,
        index: &IndexDescriptor,
        range: &KeyRange,
        consistency: ReadConsistency,
    ) -> StoreResult<IndexEntryIter<'_>> {
        (**self).scan_index(index, range, consistency)
    }

    fn load_record(
        &self,
        record_type: &str,
        primary_key: &Value,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<Record>> {
        (**self).load_record(record_type, primary_key, consistency)
    }

    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64> {
        (**self).rank_of(index, value)
    }

    fn select_rank(&self, index: &IndexDescriptor, rank: u64) -> StoreResult<Option<Value>> {
        (**self).select_rank(index, rank)
    }

    fn rank_count(&self, index: &IndexDescriptor) -> StoreResult<u64> {
        (**self).rank_count(index)
    }

    fn snapshot(&self) -> Box<dyn RecordStore + '_> {
        (**self).snapshot()
    }
}

/// Write side of a store transaction.
pub trait StoreTransaction: RecordStore {
    /// Insert or replace a record, maintaining every index
    fn save_record(&mut self, record_type: &str, record: Record) -> StoreResult<()>;

    /// Delete by primary key. Returns whether a record existed.
    fn delete_record(&mut self, record_type: &str, primary_key: &Value) -> StoreResult<bool>;

    /// Publish the writes, or fail with a conflict
    fn commit(&mut self) -> StoreResult<()>;

    /// Discard the writes
    fn cancel(&mut self);
}
