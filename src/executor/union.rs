//! Union cursors
//!
//! Ordered mode merges children sorted on a shared key through a min-heap
//! holding at most one record per child. Unordered mode drains children
//! one after another. Both suppress repeated dedup keys: ordered mode by
//! comparing with the previous record when the merge key ends in the
//! dedup key, otherwise through a set of emitted keys.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use super::cursor::{Advance, RecordCursor};
use super::errors::ExecutorResult;
use crate::schema::{FieldAccessor, Record};
use crate::value::Value;

/// Values of `fields` in order
pub(crate) fn sort_key(fields: &[FieldAccessor], record: &Record) -> Vec<Value> {
    fields.iter().map(|f| f.get(record).clone()).collect()
}

/// Suppresses records whose dedup key was already emitted
pub(crate) struct Dedup {
    field: FieldAccessor,
    adjacent: bool,
    last: Option<Value>,
    seen: HashSet<Value>,
}

impl Dedup {
    /// `adjacent` is only sound when duplicates arrive back to back
    pub(crate) fn new(field: FieldAccessor, adjacent: bool) -> Self {
        Self {
            field,
            adjacent,
            last: None,
            seen: HashSet::new(),
        }
    }

    fn is_repeat(&mut self, record: &Record) -> bool {
        let key = self.field.get(record);
        if self.adjacent {
            if self.last.as_ref() == Some(key) {
                return true;
            }
            self.last = Some(key.clone());
            false
        } else {
            !self.seen.insert(key.clone())
        }
    }
}

struct HeapItem {
    key: Vec<Value>,
    child: usize,
    record: Record,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then(self.child.cmp(&other.child))
    }
}

/// K-way merge of children ordered on `merge_key`
pub(crate) struct OrderedUnion<'a> {
    children: Vec<Box<dyn RecordCursor + 'a>>,
    merge_key: Vec<FieldAccessor>,
    dedup: Option<Dedup>,
    heap: BinaryHeap<Reverse<HeapItem>>,
    primed: bool,
}

impl<'a> OrderedUnion<'a> {
    pub(crate) fn new(
        children: Vec<Box<dyn RecordCursor + 'a>>,
        merge_key: Vec<FieldAccessor>,
        dedup: Option<Dedup>,
    ) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(children.len()),
            children,
            merge_key,
            dedup,
            primed: false,
        }
    }

    fn refill(&mut self, child: usize) -> ExecutorResult<()> {
        if let Some(record) = self.children[child].next()? {
            self.heap.push(Reverse(HeapItem {
                key: sort_key(&self.merge_key, &record),
                child,
                record,
            }));
        }
        Ok(())
    }
}

impl Advance for OrderedUnion<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        if !self.primed {
            for child in 0..self.children.len() {
                self.refill(child)?;
            }
            self.primed = true;
        }
        while let Some(Reverse(item)) = self.heap.pop() {
            self.refill(item.child)?;
            if let Some(dedup) = self.dedup.as_mut() {
                if dedup.is_repeat(&item.record) {
                    continue;
                }
            }
            return Ok(Some(item.record));
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Union"
    }
}

/// Children drained one after another
pub(crate) struct UnorderedUnion<'a> {
    children: Vec<Box<dyn RecordCursor + 'a>>,
    current: usize,
    dedup: Option<Dedup>,
}

impl<'a> UnorderedUnion<'a> {
    pub(crate) fn new(children: Vec<Box<dyn RecordCursor + 'a>>, dedup: Option<Dedup>) -> Self {
        Self {
            children,
            current: 0,
            dedup,
        }
    }
}

impl Advance for UnorderedUnion<'_> {
    fn advance(&mut self) -> ExecutorResult<Option<Record>> {
        while self.current < self.children.len() {
            match self.children[self.current].next()? {
                Some(record) => {
                    if let Some(dedup) = self.dedup.as_mut() {
                        if dedup.is_repeat(&record) {
                            continue;
                        }
                    }
                    return Ok(Some(record));
                }
                None => self.current += 1,
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Union"
    }
}
