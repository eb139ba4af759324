//! Residual filter and limit cursors

use super::cursor::{Advance, RecordCursor};
use super::errors::ExecutorResult;
use crate::filter::CompiledFilter;
use crate::schema::Record;
use crate::storage::RecordStore;

/// Child records that satisfy a compiled residual
pub(crate) struct FilterCursor<'a> {
    child: Box<dyn RecordCursor + 'a>,
    residual: CompiledFilter,
    store: &'a dyn RecordStore,
}

impl<'a> FilterCursor<'a> {
    pub(crate) fn new(child: Box<dyn RecordCursor + 'a>, residual: CompiledFilter, store: &'a dyn RecordStore) -> Self {
        Self { child, residual, store }
    }
}

impl Advance for FilterCursor<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        while let Some(record) = self.child.next()? {
            if self.residual.matches(&record, self.store)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Filter"
    }
}

/// First `limit` child records. The child is not pulled past the limit.
pub(crate) struct LimitCursor<'a> {
    child: Box<dyn RecordCursor + 'a>,
    remaining: usize,
}

impl<'a> LimitCursor<'a> {
    pub(crate) fn new(child: Box<dyn RecordCursor + 'a>, limit: usize) -> Self {
        Self {
            child,
            remaining: limit,
        }
    }
}

impl Advance for LimitCursor<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let record = self.child.next()?;
        if record.is_some() {
            self.remaining -= 1;
        }
        Ok(record)
    }

    fn name(&self) -> &'static str {
        "Limit"
    }
}
