//! Statistics sources and the per-query snapshot

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::errors::{EstimationError, EstimationResult};
use super::histogram::Histogram;
use super::table::TableStats;
use crate::schema::{IndexCatalog, IndexDescriptor, RecordType};
use crate::storage::{ReadConsistency, RecordStore, StoreResult};
use crate::value::Value;

/// Producer of table statistics and index histograms.
pub trait StatisticsSource: Send + Sync {
    /// Statistics for a record type, if any were collected
    fn table_statistics(&self, record_type: &str) -> EstimationResult<Option<TableStats>>;

    /// Histogram over an index's leading field, if any was collected
    fn histogram(&self, index: &IndexDescriptor) -> EstimationResult<Option<Histogram>>;
}

/// Source with no statistics at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStatistics;

impl StatisticsSource for NoStatistics {
    fn table_statistics(&self, _: &str) -> EstimationResult<Option<TableStats>> {
        Ok(None)
    }

    fn histogram(&self, _: &IndexDescriptor) -> EstimationResult<Option<Histogram>> {
        Ok(None)
    }
}

/// Statistics held in memory, refreshed by callers or by [`analyze`](Self::analyze).
#[derive(Debug, Default)]
pub struct MemoryStatistics {
    tables: RwLock<HashMap<String, TableStats>>,
    histograms: RwLock<HashMap<String, Histogram>>,
}

impl MemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_table_stats(&self, stats: TableStats) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stats.record_type.clone(), stats);
    }

    pub fn set_histogram(&self, index: impl Into<String>, histogram: Histogram) {
        self.histograms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index.into(), histogram);
    }

    /// Drop everything collected for a record type
    pub fn clear(&self, record_type: &str, catalog: &dyn IndexCatalog) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(record_type);
        let mut histograms = self.histograms.write().unwrap_or_else(PoisonError::into_inner);
        for index in catalog.indexes(record_type) {
            histograms.remove(&index.name);
        }
    }

    /// Scan a record type and rebuild its statistics.
    ///
    /// Collects the row count, per-field distinct counts and one equi-depth
    /// histogram per plannable index.
    pub fn analyze(
        &self,
        store: &dyn RecordStore,
        catalog: &dyn IndexCatalog,
        record_type: &RecordType,
        bucket_count: usize,
    ) -> StoreResult<()> {
        // every pass reads the same state
        let view = store.snapshot();
        let store = view.as_ref();
        let mut distinct: Vec<HashSet<Value>> = vec![HashSet::new(); record_type.fields().len()];
        let mut rows = 0u64;
        for record in store.scan_records(record_type.name(), ReadConsistency::Snapshot)? {
            let record = record?;
            rows += 1;
            for (set, value) in distinct.iter_mut().zip(record.values()) {
                set.insert(value.clone());
            }
        }

        let mut stats = TableStats::new(record_type.name(), rows);
        for (def, set) in record_type.fields().iter().zip(&distinct) {
            stats = stats.with_distinct(def.name.clone(), set.len() as u64);
        }
        self.set_table_stats(stats);

        for index in catalog.indexes(record_type.name()) {
            if !index.is_plannable() {
                continue;
            }
            let Some(position) = index
                .leading_field()
                .and_then(|f| record_type.accessor(f))
                .map(|a| a.position())
            else {
                continue;
            };
            let mut values: Vec<Value> = Vec::with_capacity(rows as usize);
            for record in store.scan_records(record_type.name(), ReadConsistency::Snapshot)? {
                if let Some(v) = record?.values().get(position) {
                    values.push(v.clone());
                }
            }
            values.sort();
            self.set_histogram(index.name.clone(), Histogram::from_sorted(&values, bucket_count));
        }
        Ok(())
    }
}

impl StatisticsSource for MemoryStatistics {
    fn table_statistics(&self, record_type: &str) -> EstimationResult<Option<TableStats>> {
        Ok(self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(record_type)
            .cloned())
    }

    fn histogram(&self, index: &IndexDescriptor) -> EstimationResult<Option<Histogram>> {
        Ok(self
            .histograms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index.name)
            .cloned())
    }
}

/// Validated statistics for one query, fetched before any cost arithmetic.
///
/// Statistics that fail validation are left out and reported in
/// [`rejected`](Self::rejected).
#[derive(Debug, Clone, Default)]
pub struct StatisticsSnapshot {
    table: Option<TableStats>,
    histograms: HashMap<String, Histogram>,
    /// Leading field -> first index whose histogram covers it
    by_field: HashMap<String, String>,
    rejected: Vec<EstimationError>,
}

impl StatisticsSnapshot {
    /// Snapshot without statistics
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fetch and validate statistics for a record type and its indexes
    pub fn gather(
        source: &dyn StatisticsSource,
        record_type: &RecordType,
        indexes: &[Arc<IndexDescriptor>],
    ) -> Self {
        let mut snapshot = Self::default();

        match source
            .table_statistics(record_type.name())
            .and_then(|t| t.map(|t| t.validate().map(|_| t)).transpose())
        {
            Ok(table) => snapshot.table = table,
            Err(err) => snapshot.rejected.push(err),
        }

        for index in indexes {
            let fetched = source.histogram(index).and_then(|h| {
                h.map(|h| Self::check_histogram(record_type, index, h))
                    .transpose()
            });
            match fetched {
                // nothing to estimate from; selectivity falls back to the defaults
                Ok(Some(histogram)) if histogram.buckets.is_empty() => {}
                Ok(Some(histogram)) => {
                    if let Some(field) = index.leading_field() {
                        snapshot
                            .by_field
                            .entry(field.to_string())
                            .or_insert_with(|| index.name.clone());
                    }
                    snapshot.histograms.insert(index.name.clone(), histogram);
                }
                Ok(None) => {}
                Err(err) => snapshot.rejected.push(err),
            }
        }
        snapshot
    }

    fn check_histogram(
        record_type: &RecordType,
        index: &IndexDescriptor,
        histogram: Histogram,
    ) -> EstimationResult<Histogram> {
        histogram.validate(&index.name)?;
        let field_type = index
            .leading_field()
            .and_then(|f| record_type.fields().iter().find(|d| d.name == f))
            .map(|d| d.field_type);
        if let (Some(field_type), Some(tag)) = (field_type, histogram.value_tag()) {
            if !field_type.accepts(tag) {
                return Err(EstimationError::HistogramTypeMismatch {
                    index: index.name.clone(),
                    expected: field_type.type_name(),
                    actual: tag.as_str(),
                });
            }
        }
        Ok(histogram)
    }

    pub fn table(&self) -> Option<&TableStats> {
        self.table.as_ref()
    }

    pub fn has_table_stats(&self) -> bool {
        self.table.is_some()
    }

    pub fn row_count(&self) -> Option<u64> {
        self.table.as_ref().map(|t| t.row_count)
    }

    pub fn distinct(&self, field: &str) -> Option<u64> {
        self.table.as_ref().and_then(|t| t.distinct(field))
    }

    pub fn histogram(&self, index: &str) -> Option<&Histogram> {
        self.histograms.get(index)
    }

    /// Histogram over `field`, from any index led by it
    pub fn field_histogram(&self, field: &str) -> Option<&Histogram> {
        self.by_field.get(field).and_then(|name| self.histograms.get(name))
    }

    /// Statistics dropped during validation
    pub fn rejected(&self) -> &[EstimationError] {
        &self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, SchemaCatalog};
    use crate::stats::Bucket;

    fn setup() -> (SchemaCatalog, Arc<RecordType>) {
        let mut catalog = SchemaCatalog::new();
        let rt = catalog
            .register_record_type(
                RecordType::builder("users")
                    .field("id", FieldType::Int)
                    .field("age", FieldType::Int)
                    .primary_key("id")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register_index(IndexDescriptor::value("by_age", "users", ["age"]))
            .unwrap();
        (catalog, rt)
    }

    #[test]
    fn test_gather_keeps_valid_statistics() {
        let (catalog, rt) = setup();
        let stats = MemoryStatistics::new();
        stats.set_table_stats(TableStats::new("users", 100).with_distinct("age", 10));
        stats.set_histogram("by_age", Histogram::new(vec![Bucket::new(0, 50, 100, 10)]));

        let snapshot = StatisticsSnapshot::gather(&stats, &rt, &catalog.indexes("users"));
        assert_eq!(snapshot.row_count(), Some(100));
        assert_eq!(snapshot.distinct("age"), Some(10));
        assert!(snapshot.histogram("by_age").is_some());
        assert_eq!(snapshot.field_histogram("age"), snapshot.histogram("by_age"));
        assert!(snapshot.field_histogram("id").is_none());
        assert!(snapshot.rejected().is_empty());
    }

    #[test]
    fn test_gather_rejects_corrupt_statistics() {
        let (catalog, rt) = setup();
        let stats = MemoryStatistics::new();
        stats.set_table_stats(TableStats::new("users", 1).with_distinct("age", 5));
        stats.set_histogram("by_age", Histogram::new(vec![Bucket::new("a", "z", 10, 3)]));

        let snapshot = StatisticsSnapshot::gather(&stats, &rt, &catalog.indexes("users"));
        assert!(!snapshot.has_table_stats());
        assert!(snapshot.histogram("by_age").is_none());
        assert_eq!(snapshot.rejected().len(), 2);
        assert!(matches!(
            snapshot.rejected()[1],
            EstimationError::HistogramTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_gather_skips_empty_histogram() {
        let (catalog, rt) = setup();
        let stats = MemoryStatistics::new();
        stats.set_table_stats(TableStats::new("users", 100).with_distinct("age", 10));
        stats.set_histogram("by_age", Histogram::from_sorted(&[Value::Int(1), Value::Int(2)], 0));

        let snapshot = StatisticsSnapshot::gather(&stats, &rt, &catalog.indexes("users"));
        assert!(snapshot.histogram("by_age").is_none());
        assert!(snapshot.field_histogram("age").is_none());
        assert!(snapshot.rejected().is_empty());
    }

    #[test]
    fn test_no_statistics() {
        let (catalog, rt) = setup();
        let snapshot = StatisticsSnapshot::gather(&NoStatistics, &rt, &catalog.indexes("users"));
        assert!(!snapshot.has_table_stats());
        assert!(snapshot.rejected().is_empty());
    }
}
