//! In-memory record store with optimistic snapshot transactions
//!
//! Committed state is an immutable `Arc<StoreState>`. Reads clone the Arc
//! and iterate over it by re-seeking past the last returned key, so scans
//! stay lazy without holding any lock. Transactions copy the state on
//! first write and publish it at commit if no conflicting commit landed
//! since they began.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::errors::{StoreError, StoreResult};
use super::store::{
    IndexEntry, IndexEntryIter, KeyRange, ReadConsistency, RecordIter, RecordStore,
    StoreTransaction,
};
use crate::rank::RankedSet;
use crate::schema::{IndexCatalog, IndexDescriptor, Record, RecordType};
use crate::value::Value;

type Catalog = Arc<dyn IndexCatalog + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct StoreState {
    tables: HashMap<String, TableData>,
}

#[derive(Debug, Clone, Default)]
struct TableData {
    /// Bumped on every commit that writes the table
    version: u64,
    records: BTreeMap<Value, Record>,
    indexes: HashMap<String, IndexData>,
}

#[derive(Debug, Clone)]
struct IndexData {
    entries: BTreeSet<(Vec<Value>, Value)>,
    ranks: Option<RankedSet<Value>>,
}

fn index_key(record_type: &RecordType, index: &IndexDescriptor, record: &Record) -> Vec<Value> {
    index
        .key_fields
        .iter()
        .map(|field| {
            record_type
                .accessor(field)
                .map_or(Value::Null, |a| record.get(a).clone())
        })
        .collect()
}

/// Keep only the fields an index entry carries.
fn project(record_type: &RecordType, index: &IndexDescriptor, record: &Record) -> Record {
    let pk = record_type.primary_key_field();
    let values = record_type
        .fields()
        .iter()
        .zip(record.values())
        .map(|(def, value)| {
            if def.name == pk || index.stores_field(&def.name) {
                value.clone()
            } else {
                Value::Null
            }
        })
        .collect();
    Record::from_values(values)
}

fn state_table<'s>(state: &'s StoreState, name: &str) -> Option<&'s TableData> {
    state.tables.get(name)
}

fn rank_set<'s>(state: &'s StoreState, index: &IndexDescriptor) -> StoreResult<Option<&'s RankedSet<Value>>> {
    if !index.is_rank() {
        return Err(StoreError::NotRankIndex(index.name.clone()));
    }
    Ok(state_table(state, &index.record_type)
        .and_then(|t| t.indexes.get(&index.name))
        .and_then(|i| i.ranks.as_ref()))
}

/// Store reads shared by the committed store and transactions.
#[derive(Clone)]
struct StateReader {
    catalog: Catalog,
    state: Arc<StoreState>,
}

impl StateReader {
    fn record_type(&self, name: &str) -> StoreResult<Arc<RecordType>> {
        self.catalog
            .record_type(name)
            .ok_or_else(|| StoreError::UnknownRecordType(name.to_string()))
    }

    fn check_index(&self, index: &IndexDescriptor) -> StoreResult<Arc<RecordType>> {
        let record_type = self.record_type(&index.record_type)?;
        if !self
            .catalog
            .indexes(&index.record_type)
            .iter()
            .any(|i| i.name == index.name)
        {
            return Err(StoreError::UnknownIndex(index.name.clone()));
        }
        Ok(record_type)
    }

    // Committed state has no conflict set: both levels read the same data.
    fn scan_records(&self, record_type: &str, _: ReadConsistency) -> StoreResult<RecordIter<'static>> {
        self.record_type(record_type)?;
        Ok(Box::new(RecordScan {
            state: Arc::clone(&self.state),
            record_type: record_type.to_string(),
            after: None,
        }))
    }

    fn scan_index(
        &self,
        index: &IndexDescriptor,
        range: &KeyRange,
        _: ReadConsistency,
    ) -> StoreResult<IndexEntryIter<'static>> {
        let record_type = self.check_index(index)?;
        Ok(Box::new(IndexScan {
            state: Arc::clone(&self.state),
            record_type,
            index: index.clone(),
            range: range.clone(),
            after: None,
            done: false,
        }))
    }

    fn load_record(
        &self,
        record_type: &str,
        primary_key: &Value,
        _: ReadConsistency,
    ) -> StoreResult<Option<Record>> {
        self.record_type(record_type)?;
        Ok(state_table(&self.state, record_type).and_then(|t| t.records.get(primary_key).cloned()))
    }

    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64> {
        self.check_index(index)?;
        Ok(rank_set(&self.state, index)?.map_or(0, |r| r.rank(value) as u64))
    }

    fn select_rank(&self, index: &IndexDescriptor, rank: u64) -> StoreResult<Option<Value>> {
        self.check_index(index)?;
        let Ok(rank) = usize::try_from(rank) else {
            return Ok(None);
        };
        Ok(rank_set(&self.state, index)?.and_then(|r| r.select(rank).cloned()))
    }

    fn rank_count(&self, index: &IndexDescriptor) -> StoreResult<u64> {
        self.check_index(index)?;
        Ok(rank_set(&self.state, index)?.map_or(0, |r| r.len() as u64))
    }
}

struct RecordScan {
    state: Arc<StoreState>,
    record_type: String,
    after: Option<Value>,
}

impl Iterator for RecordScan {
    type Item = StoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = state_table(&self.state, &self.record_type)?;
        let lower = match &self.after {
            Some(pk) => Bound::Excluded(pk),
            None => Bound::Unbounded,
        };
        let (pk, record) = table.records.range::<Value, _>((lower, Bound::Unbounded)).next()?;
        self.after = Some(pk.clone());
        Some(Ok(record.clone()))
    }
}

struct IndexScan {
    state: Arc<StoreState>,
    record_type: Arc<RecordType>,
    index: IndexDescriptor,
    range: KeyRange,
    after: Option<(Vec<Value>, Value)>,
    done: bool,
}

impl Iterator for IndexScan {
    type Item = StoreResult<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let table = state_table(&self.state, &self.index.record_type)?;
        let data = table.indexes.get(&self.index.name)?;

        let (start, resumed) = match self.after.take() {
            Some(after) => (after, true),
            None => ((self.range.start_key(), Value::Null), false),
        };
        let lower = if resumed {
            Bound::Excluded(&start)
        } else {
            Bound::Included(&start)
        };

        for (key, pk) in data
            .entries
            .range::<(Vec<Value>, Value), _>((lower, Bound::Unbounded))
        {
            if self.range.is_past(key) {
                break;
            }
            if !self.range.contains(key) {
                continue;
            }
            self.after = Some((key.clone(), pk.clone()));
            let stored = match table.records.get(pk) {
                Some(record) => project(&self.record_type, &self.index, record),
                None => {
                    self.done = true;
                    return Some(Err(StoreError::Io(format!(
                        "index '{}' references missing record {}",
                        self.index.name, pk
                    ))));
                }
            };
            return Some(Ok(IndexEntry {
                key: key.clone(),
                primary_key: pk.clone(),
                stored,
            }));
        }

        self.done = true;
        None
    }
}

/// Thread-safe in-memory store.
pub struct MemoryStore {
    catalog: Catalog,
    committed: RwLock<Arc<StoreState>>,
    rank_seed: Option<u64>,
}

impl MemoryStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            committed: RwLock::new(Arc::new(StoreState::default())),
            rank_seed: None,
        }
    }

    /// Seed the rank index skip lists for reproducible layouts
    pub fn with_rank_seed(mut self, seed: u64) -> Self {
        self.rank_seed = Some(seed);
        self
    }

    fn reader(&self) -> StateReader {
        let state = self
            .committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        StateReader {
            catalog: Arc::clone(&self.catalog),
            state,
        }
    }

    /// Begin a transaction over the current committed snapshot
    pub fn begin(&self) -> MemoryTransaction<'_> {
        let reader = self.reader();
        let begin_versions = reader
            .state
            .tables
            .iter()
            .map(|(name, t)| (name.clone(), t.version))
            .collect();
        MemoryTransaction {
            store: self,
            reader,
            begin_versions,
            written: BTreeSet::new(),
            read: Mutex::new(BTreeSet::new()),
            open: true,
        }
    }

    /// Save records in one transaction and commit it
    pub fn insert_all(
        &self,
        record_type: &str,
        records: impl IntoIterator<Item = Record>,
    ) -> StoreResult<()> {
        let mut txn = self.begin();
        for record in records {
            txn.save_record(record_type, record)?;
        }
        txn.commit()
    }

    fn new_table(&self, record_type: &str) -> TableData {
        let indexes = self
            .catalog
            .indexes(record_type)
            .into_iter()
            .filter(|i| i.is_plannable())
            .map(|index| {
                let ranks = index.is_rank().then(|| match self.rank_seed {
                    Some(seed) => RankedSet::with_seed(seed),
                    None => RankedSet::new(),
                });
                (
                    index.name.clone(),
                    IndexData {
                        entries: BTreeSet::new(),
                        ranks,
                    },
                )
            })
            .collect();
        TableData {
            version: 0,
            records: BTreeMap::new(),
            indexes,
        }
    }
}

/// Direct reads each see the latest committed state; use
/// [`RecordStore::snapshot`] to keep several reads on one state. There is
/// no conflict set outside a transaction, so both consistency levels read
/// committed data.
impl RecordStore for MemoryStore {
    fn scan_records(
        &self,
        record_type: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<RecordIter<'_>> {
        self.reader().scan_records(record_type, consistency)
    }

    fn scan_index(
        &self,
        index: &IndexDescriptor,
        range: &KeyRange,
        consistency: ReadConsistency,
    ) -> StoreResult<IndexEntryIter<'_>> {
        self.reader().scan_index(index, range, consistency)
    }

    fn load_record(
        &self,
        record_type: &str,
        primary_key: &Value,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<Record>> {
        self.reader().load_record(record_type, primary_key, consistency)
    }

    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64> {
        self.reader().rank_of(index, value)
    }

    fn select_rank(&self, index: &IndexDescriptor, rank: u64) -> StoreResult<Option<Value>> {
        self.reader().select_rank(index, rank)
    }

    fn rank_count(&self, index: &IndexDescriptor) -> StoreResult<u64> {
        self.reader().rank_count(index)
    }

    fn snapshot(&self) -> Box<dyn RecordStore + '_> {
        Box::new(MemorySnapshot {
            reader: self.reader(),
        })
    }
}

/// Committed state of a [`MemoryStore`] as of [`RecordStore::snapshot`].
pub struct MemorySnapshot {
    reader: StateReader,
}

impl RecordStore for MemorySnapshot {
    fn scan_records(
        &self,
        record_type: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<RecordIter<'_>> {
        self.reader.scan_records(record_type, consistency)
    }

    fn scan_index(
        &self,
        index: &IndexDescriptor,
        range: &KeyRange,
        consistency: ReadConsistency,
    ) -> StoreResult<IndexEntryIter<'_>> {
        self.reader.scan_index(index, range, consistency)
    }

    fn load_record(
        &self,
        record_type: &str,
        primary_key: &Value,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<Record>> {
        self.reader.load_record(record_type, primary_key, consistency)
    }

    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64> {
        self.reader.rank_of(index, value)
    }

    fn select_rank(&self, index: &IndexDescriptor, rank: u64) -> StoreResult<Option<Value>> {
        self.reader.select_rank(index, rank)
    }

    fn rank_count(&self, index: &IndexDescriptor) -> StoreResult<u64> {
        self.reader.rank_count(index)
    }

    fn snapshot(&self) -> Box<dyn RecordStore + '_> {
        Box::new(MemorySnapshot {
            reader: self.reader.clone(),
        })
    }
}

/// Snapshot transaction over a [`MemoryStore`].
///
/// Reads see the begin snapshot plus this transaction's own writes.
/// Serializable reads add the table to the conflict set; snapshot reads
/// do not.
pub struct MemoryTransaction<'s> {
    store: &'s MemoryStore,
    reader: StateReader,
    begin_versions: HashMap<String, u64>,
    written: BTreeSet<String>,
    read: Mutex<BTreeSet<String>>,
    open: bool,
}

impl MemoryTransaction<'_> {
    fn note_read(&self, record_type: &str, consistency: ReadConsistency) {
        if consistency == ReadConsistency::Serializable {
            self.read
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(record_type.to_string());
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed)
        }
    }

    fn table_mut(&mut self, record_type: &str) -> &mut TableData {
        let store = self.store;
        Arc::make_mut(&mut self.reader.state)
            .tables
            .entry(record_type.to_string())
            .or_insert_with(|| store.new_table(record_type))
    }

    fn unlink(table: &mut TableData, record_type: &RecordType, indexes: &[Arc<IndexDescriptor>], pk: &Value) -> Option<Record> {
        let old = table.records.remove(pk)?;
        for index in indexes {
            let key = index_key(record_type, index, &old);
            if let Some(data) = table.indexes.get_mut(&index.name) {
                if let Some(ranks) = data.ranks.as_mut() {
                    if let Some(value) = key.first() {
                        ranks.remove(value);
                    }
                }
                data.entries.remove(&(key, pk.clone()));
            }
        }
        Some(old)
    }
}

impl RecordStore for MemoryTransaction<'_> {
    fn scan_records(
        &self,
        record_type: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<RecordIter<'_>> {
        self.ensure_open()?;
        self.note_read(record_type, consistency);
        self.reader.scan_records(record_type, consistency)
    }

    fn scan_index(
        &self,
        index: &IndexDescriptor,
        range: &KeyRange,
        consistency: ReadConsistency,
    ) -> StoreResult<IndexEntryIter<'_>> {
        self.ensure_open()?;
        self.note_read(&index.record_type, consistency);
        self.reader.scan_index(index, range, consistency)
    }

    fn load_record(
        &self,
        record_type: &str,
        primary_key: &Value,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<Record>> {
        self.ensure_open()?;
        self.note_read(record_type, consistency);
        self.reader.load_record(record_type, primary_key, consistency)
    }

    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64> {
        self.ensure_open()?;
        self.reader.rank_of(index, value)
    }

    fn select_rank(&self, index: &IndexDescriptor, rank: u64) -> StoreResult<Option<Value>> {
        self.ensure_open()?;
        self.reader.select_rank(index, rank)
    }

    fn rank_count(&self, index: &IndexDescriptor) -> StoreResult<u64> {
        self.ensure_open()?;
        self.reader.rank_count(index)
    }

    /// Transaction reads already see one state: writes need `&mut self`,
    /// so none can land while the view is borrowed.
    fn snapshot(&self) -> Box<dyn RecordStore + '_> {
        Box::new(self)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn save_record(&mut self, record_type_name: &str, record: Record) -> StoreResult<()> {
        self.ensure_open()?;
        let record_type = self.reader.record_type(record_type_name)?;
        record_type.validate(&record)?;
        let indexes: Vec<_> = self
            .reader
            .catalog
            .indexes(record_type_name)
            .into_iter()
            .filter(|i| i.is_plannable())
            .collect();
        let pk = record.get(record_type.primary_key()).clone();

        let table = self.table_mut(record_type_name);
        for index in indexes.iter().filter(|i| i.unique) {
            let key = index_key(&record_type, index, &record);
            let taken = table.indexes.get(&index.name).and_then(|data| {
                data.entries
                    .range((key.clone(), Value::Null)..)
                    .next()
                    .filter(|(k, other)| *k == key && *other != pk)
            });
            if taken.is_some() {
                return Err(StoreError::UniqueViolation {
                    index: index.name.clone(),
                    key: format!("{:?}", key),
                });
            }
        }

        Self::unlink(table, &record_type, &indexes, &pk);
        for index in &indexes {
            let key = index_key(&record_type, index, &record);
            if let Some(data) = table.indexes.get_mut(&index.name) {
                if let Some(ranks) = data.ranks.as_mut() {
                    if let Some(value) = key.first() {
                        ranks.insert(value.clone());
                    }
                }
                data.entries.insert((key, pk.clone()));
            }
        }
        table.records.insert(pk, record);
        self.written.insert(record_type_name.to_string());
        Ok(())
    }

    fn delete_record(&mut self, record_type_name: &str, primary_key: &Value) -> StoreResult<bool> {
        self.ensure_open()?;
        let record_type = self.reader.record_type(record_type_name)?;
        let indexes = self.reader.catalog.indexes(record_type_name);
        let existed = self
            .reader
            .state
            .tables
            .get(record_type_name)
            .is_some_and(|t| t.records.contains_key(primary_key));
        if !existed {
            return Ok(false);
        }

        let table = self.table_mut(record_type_name);
        Self::unlink(table, &record_type, &indexes, primary_key);
        self.written.insert(record_type_name.to_string());
        Ok(true)
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.open = false;
        if self.written.is_empty() {
            return Ok(());
        }

        let read = std::mem::take(&mut *self.read.lock().unwrap_or_else(PoisonError::into_inner));
        let mut committed = self
            .store
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for name in self.written.iter().chain(&read) {
            let current = committed.tables.get(name).map_or(0, |t| t.version);
            let begin = self.begin_versions.get(name).copied().unwrap_or(0);
            if current != begin {
                return Err(StoreError::Conflict {
                    record_type: name.clone(),
                });
            }
        }

        let mut next = StoreState::clone(&committed);
        for name in &self.written {
            if let Some(table) = self.reader.state.tables.get(name) {
                let mut table = table.clone();
                table.version = self.begin_versions.get(name).copied().unwrap_or(0) + 1;
                next.tables.insert(name.clone(), table);
            }
        }
        *committed = Arc::new(next);
        Ok(())
    }

    fn cancel(&mut self) {
        self.open = false;
        self.written.clear();
    }
}
