//! IN-join cursor
//!
//! Values are looked up in batches of `batch_size`. Each batch is an
//! unordered union of one prefix scan per value; batches run one after
//! another, so at most one batch of scans is open at a time.

use std::sync::Arc;

use super::cursor::{Advance, CancellationToken, RecordCursor, Stateful};
use super::errors::ExecutorResult;
use super::scan::IndexScan;
use super::union::UnorderedUnion;
use crate::planner::ScanBounds;
use crate::schema::{IndexDescriptor, Record};
use crate::storage::{KeyRange, ReadConsistency, RecordStore};
use crate::value::Value;

pub(crate) struct InJoin<'a> {
    store: &'a dyn RecordStore,
    index: Arc<IndexDescriptor>,
    values: Vec<Value>,
    batch_size: usize,
    consistency: ReadConsistency,
    cancel: CancellationToken,
    next_value: usize,
    batch: Option<Box<dyn RecordCursor + 'a>>,
}

impl<'a> InJoin<'a> {
    pub(crate) fn new(
        store: &'a dyn RecordStore,
        index: Arc<IndexDescriptor>,
        values: Vec<Value>,
        batch_size: usize,
        consistency: ReadConsistency,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            index,
            values,
            batch_size: batch_size.max(1),
            consistency,
            cancel,
            next_value: 0,
            batch: None,
        }
    }

    /// Open the next batch, or return false when every value is done
    fn open_batch(&mut self) -> bool {
        if self.next_value >= self.values.len() {
            return false;
        }
        let end = (self.next_value + self.batch_size).min(self.values.len());
        let scans: Vec<Box<dyn RecordCursor + 'a>> = self.values[self.next_value..end]
            .iter()
            .map(|value| {
                let scan = IndexScan::new(
                    self.store,
                    Arc::clone(&self.index),
                    ScanBounds::Value(KeyRange::prefix(vec![value.clone()])),
                    false,
                    self.consistency,
                );
                Box::new(Stateful::new(scan, self.cancel.clone())) as Box<dyn RecordCursor + 'a>
            })
            .collect();
        self.next_value = end;
        self.batch = Some(Box::new(Stateful::new(
            UnorderedUnion::new(scans, None),
            self.cancel.clone(),
        )));
        true
    }
}

impl Advance for InJoin<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        loop {
            if let Some(batch) = self.batch.as_mut() {
                if let Some(record) = batch.next()? {
                    return Ok(Some(record));
                }
                self.batch = None;
            }
            if !self.open_batch() {
                return Ok(None);
            }
        }
    }

    fn name(&self) -> &'static str {
        "InJoin"
    }
}
