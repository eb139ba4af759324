//! Leaf cursors: full scans, index scans and rank scans
//!
//! Leaves open their store iterator on the first pull.

use std::ops::Bound;
use std::sync::Arc;

use super::cursor::Advance;
use super::errors::ExecutorResult;
use crate::planner::ScanBounds;
use crate::schema::{IndexDescriptor, Record};
use crate::storage::{IndexEntryIter, KeyRange, ReadConsistency, RecordIter, RecordStore};

/// Every record of a type in primary-key order
pub(crate) struct FullScan<'a> {
    store: &'a dyn RecordStore,
    record_type: String,
    consistency: ReadConsistency,
    records: Option<RecordIter<'a>>,
}

impl<'a> FullScan<'a> {
    pub(crate) fn new(store: &'a dyn RecordStore, record_type: &str, consistency: ReadConsistency) -> Self {
        Self {
            store,
            record_type: record_type.to_string(),
            consistency,
            records: None,
        }
    }
}

impl Advance for FullScan<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        if self.records.is_none() {
            self.records = Some(self.store.scan_records(&self.record_type, self.consistency)?);
        }
        match self.records.as_mut().and_then(Iterator::next) {
            Some(record) => Ok(Some(record?)),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "FullScan"
    }
}

/// Entries of one index, fetching each record unless covering.
///
/// Rank bounds become a value range when the scan opens: ranks
/// `[start, end)` hold exactly the values above the value at rank
/// `start - 1` and up to the value at rank `end - 1`.
pub(crate) struct IndexScan<'a> {
    store: &'a dyn RecordStore,
    index: Arc<IndexDescriptor>,
    bounds: ScanBounds,
    covering: bool,
    consistency: ReadConsistency,
    entries: Option<IndexEntryIter<'a>>,
    empty: bool,
}

impl<'a> IndexScan<'a> {
    pub(crate) fn new(
        store: &'a dyn RecordStore,
        index: Arc<IndexDescriptor>,
        bounds: ScanBounds,
        covering: bool,
        consistency: ReadConsistency,
    ) -> Self {
        Self {
            store,
            index,
            bounds,
            covering,
            consistency,
            entries: None,
            empty: false,
        }
    }

    /// Value range for the bounds, `None` when no value can qualify
    fn resolve_range(&self) -> ExecutorResult<Option<KeyRange>> {
        let (start, end) = match &self.bounds {
            ScanBounds::Value(range) => return Ok(Some(range.clone())),
            ScanBounds::Rank { start, end } => (*start, *end),
        };
        if end.map_or(false, |end| start >= end) {
            return Ok(None);
        }

        let lower = if start == 0 {
            Bound::Unbounded
        } else {
            match self.store.select_rank(&self.index, start - 1)? {
                Some(value) => Bound::Excluded(value),
                None => return Ok(None),
            }
        };
        let upper = match end {
            Some(end) => match self.store.select_rank(&self.index, end - 1)? {
                Some(value) => Bound::Included(value),
                None => Bound::Unbounded,
            },
            None => Bound::Unbounded,
        };
        Ok(Some(KeyRange::between(Vec::new(), lower, upper)))
    }

    fn open(&mut self) -> ExecutorResult<()> {
        match self.resolve_range()? {
            Some(range) => {
                self.entries = Some(self.store.scan_index(&self.index, &range, self.consistency)?);
            }
            None => self.empty = true,
        }
        Ok(())
    }
}

impl Advance for IndexScan<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        if self.entries.is_none() && !self.empty {
            self.open()?;
        }
        let Some(entries) = self.entries.as_mut() else {
            return Ok(None);
        };
        for entry in entries {
            let entry = entry?;
            if self.covering {
                return Ok(Some(entry.stored));
            }
            // entries without a record are skipped
            if let Some(record) =
                self.store
                    .load_record(&self.index.record_type, &entry.primary_key, self.consistency)?
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        match self.bounds {
            ScanBounds::Value(_) => "IndexScan",
            ScanBounds::Rank { .. } => "RankScan",
        }
    }
}
