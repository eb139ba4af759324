//! Intersection cursors

use super::cursor::{Advance, RecordCursor};
use super::errors::ExecutorResult;
use super::union::sort_key;
use crate::filter::CompiledFilter;
use crate::schema::{FieldAccessor, Record};
use crate::storage::RecordStore;
use crate::value::Value;

/// Merge join over children ordered on a shared key.
///
/// Holds one head per child. Emits when every head carries the same key,
/// otherwise advances the children holding the smallest key. Stops as
/// soon as any child runs dry.
pub(crate) struct MergeIntersection<'a> {
    children: Vec<Box<dyn RecordCursor + 'a>>,
    merge_key: Vec<FieldAccessor>,
    heads: Vec<Option<(Vec<Value>, Record)>>,
    done: bool,
}

impl<'a> MergeIntersection<'a> {
    pub(crate) fn new(children: Vec<Box<dyn RecordCursor + 'a>>, merge_key: Vec<FieldAccessor>) -> Self {
        Self {
            heads: (0..children.len()).map(|_| None).collect(),
            children,
            merge_key,
            done: false,
        }
    }

    /// Pull a head for every empty slot; false once any child is exhausted
    fn fill_heads(&mut self) -> ExecutorResult<bool> {
        for (child, head) in self.children.iter_mut().zip(self.heads.iter_mut()) {
            if head.is_some() {
                continue;
            }
            match child.next()? {
                Some(record) => *head = Some((sort_key(&self.merge_key, &record), record)),
                None => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl Advance for MergeIntersection<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        while !self.done {
            if self.children.is_empty() || !self.fill_heads()? {
                self.done = true;
                break;
            }

            let keys = self.heads.iter().flatten().map(|(key, _)| key);
            let (Some(min), Some(max)) = (keys.clone().min().cloned(), keys.max().cloned()) else {
                break;
            };
            if min == max {
                let first = self.heads[0].take().map(|(_, record)| record);
                self.heads.iter_mut().for_each(|head| *head = None);
                return Ok(first);
            }
            for head in self.heads.iter_mut() {
                if head.as_ref().map_or(false, |(key, _)| *key == min) {
                    *head = None;
                }
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Intersection"
    }
}

/// Streams the driver and keeps records every probe filter accepts
pub(crate) struct ProbeIntersection<'a> {
    driver: Box<dyn RecordCursor + 'a>,
    probes: Vec<CompiledFilter>,
    store: &'a dyn RecordStore,
}

impl<'a> ProbeIntersection<'a> {
    pub(crate) fn new(driver: Box<dyn RecordCursor + 'a>, probes: Vec<CompiledFilter>, store: &'a dyn RecordStore) -> Self {
        Self { driver, probes, store }
    }

    fn accepted(&self, record: &Record) -> ExecutorResult<bool> {
        for probe in &self.probes {
            if !probe.matches(record, self.store)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Advance for ProbeIntersection<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        while let Some(record) = self.driver.next()? {
            if self.accepted(&record)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Intersection"
    }
}
