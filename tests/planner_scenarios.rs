//! Planner Scenario Tests
//!
//! End-to-end checks from query to cursor:
//! - OR of indexed equalities becomes a merged union
//! - Oversized IN lists fall back to a full scan
//! - Range intersections drive from the smaller child
//! - Tables without statistics prefer any matching index

use std::collections::HashSet;
use std::sync::Arc;

use recordplan::cost::CostModel;
use recordplan::executor::{ExecuteContext, RecordCursor};
use recordplan::filter::Filter;
use recordplan::observability::Logger;
use recordplan::planner::{CandidateGenerator, Plan, PlanSelector, PlannerConfig, Query, SelectionMode};
use recordplan::rewriter::rewrite;
use recordplan::schema::{FieldType, IndexCatalog, IndexDescriptor, Record, RecordType, SchemaCatalog};
use recordplan::stats::{MemoryStatistics, NoStatistics, StatisticsSnapshot, StatisticsSource};
use recordplan::storage::MemoryStore;
use recordplan::value::Value;

// =============================================================================
// Helper Functions
// =============================================================================

fn status_of(i: i64) -> &'static str {
    match i % 40 {
        0..=3 => "open",
        4..=6 => "held",
        7..=9 => "failed",
        _ => "closed",
    }
}

/// 4000 orders: 400 open, 300 held, 300 failed, 3000 closed
fn orders() -> (Arc<SchemaCatalog>, MemoryStore) {
    let mut catalog = SchemaCatalog::new();
    let rt = catalog
        .register_record_type(
            RecordType::builder("orders")
                .field("id", FieldType::Int)
                .field("status", FieldType::String)
                .field("amount", FieldType::Int)
                .primary_key("id")
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register_index(IndexDescriptor::value("by_status", "orders", ["status"]))
        .unwrap();
    catalog
        .register_index(IndexDescriptor::value("by_amount", "orders", ["amount"]))
        .unwrap();
    let catalog = Arc::new(catalog);
    let store = MemoryStore::new(catalog.clone());
    let records = (0..4000i64).map(|i| {
        rt.record([
            ("id", Value::Int(i)),
            ("status", Value::string(status_of(i))),
            ("amount", Value::Int((i * 7) % 500)),
        ])
        .unwrap()
    });
    store.insert_all("orders", records).unwrap();
    (catalog, store)
}

/// 10000 readings with `score = i` and `age = (i * 37) % 100`
fn readings() -> (Arc<SchemaCatalog>, MemoryStore) {
    let mut catalog = SchemaCatalog::new();
    let rt = catalog
        .register_record_type(
            RecordType::builder("readings")
                .field("id", FieldType::Int)
                .field("score", FieldType::Int)
                .field("age", FieldType::Int)
                .primary_key("id")
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register_index(IndexDescriptor::value("by_score", "readings", ["score"]))
        .unwrap();
    catalog
        .register_index(IndexDescriptor::value("by_age", "readings", ["age"]))
        .unwrap();
    let catalog = Arc::new(catalog);
    let store = MemoryStore::new(catalog.clone());
    let records = (0..10_000i64).map(|i| {
        rt.record([
            ("id", Value::Int(i)),
            ("score", Value::Int(i)),
            ("age", Value::Int((i * 37) % 100)),
        ])
        .unwrap()
    });
    store.insert_all("readings", records).unwrap();
    (catalog, store)
}

fn analyzed(catalog: &SchemaCatalog, store: &MemoryStore, record_type: &str, buckets: usize) -> Arc<MemoryStatistics> {
    let stats = MemoryStatistics::new();
    let rt = catalog.record_type(record_type).unwrap();
    stats.analyze(store, catalog, &rt, buckets).unwrap();
    Arc::new(stats)
}

fn selector(catalog: &Arc<SchemaCatalog>, stats: Arc<dyn StatisticsSource>, config: PlannerConfig) -> PlanSelector {
    PlanSelector::new(catalog.clone(), stats, config)
        .unwrap()
        .with_logger(Logger::discard())
}

fn run(plan: &Plan, catalog: &SchemaCatalog, store: &MemoryStore, record_type: &str) -> Vec<Record> {
    let ctx = ExecuteContext::new(store, catalog, record_type)
        .unwrap()
        .with_logger(Logger::discard());
    let records = plan.execute(&ctx).unwrap().collect_remaining().unwrap();
    records
}

fn ids(records: &[Record]) -> Vec<i64> {
    records.iter().map(|r| r.values()[0].as_i64().unwrap()).collect()
}

// =============================================================================
// Union Tests
// =============================================================================

/// Three OR-ed equality branches matching 400/300/300 rows merge into one
/// ascending stream.
#[test]
fn test_or_of_equalities_selects_union() {
    let (catalog, store) = orders();
    let stats = analyzed(&catalog, &store, "orders", 16);
    let selector = selector(&catalog, stats, PlannerConfig::default());

    let query = Query::new("orders").with_filter(Filter::or([
        Filter::eq("status", "open"),
        Filter::eq("status", "held"),
        Filter::eq("status", "failed"),
    ]));
    let selected = selector.select(&query).unwrap();
    assert_eq!(selected.mode, SelectionMode::CostBased);
    assert_eq!(selected.plan.plan_type(), "Union");
    assert!(matches!(
        selected.plan.access_path(),
        Plan::Union { merge_key: Some(key), .. } if key == &vec!["id".to_string()]
    ));

    let got = ids(&run(&selected.plan, &catalog, &store, "orders"));
    assert_eq!(got.len(), 1000);
    assert!(got.windows(2).all(|w| w[0] < w[1]));
    let expected: Vec<i64> = (0..4000).filter(|i| i % 40 < 10).collect();
    assert_eq!(got, expected);
}

/// Overlapping branches still yield every record once.
#[test]
fn test_overlapping_branches_deduplicated() {
    let (catalog, store) = orders();
    let selector = selector(&catalog, Arc::new(NoStatistics), PlannerConfig::default());

    let query = Query::new("orders").with_filter(Filter::or([
        Filter::eq("status", "open"),
        Filter::lt("amount", 50),
    ]));
    let selected = selector.select(&query).unwrap();
    assert_eq!(selected.plan.plan_type(), "Union");

    let got = ids(&run(&selected.plan, &catalog, &store, "orders"));
    let unique: HashSet<i64> = got.iter().copied().collect();
    assert_eq!(unique.len(), got.len());

    let expected: HashSet<i64> = (0..4000i64)
        .filter(|i| status_of(*i) == "open" || (i * 7) % 500 < 50)
        .collect();
    assert_eq!(unique, expected);
}

// =============================================================================
// IN List Tests
// =============================================================================

/// An IN list longer than the limit gets no IN-join.
#[test]
fn test_long_in_list_falls_back_to_full_scan() {
    let (catalog, store) = orders();
    let (logger, buffer) = Logger::memory();
    let selector = PlanSelector::new(catalog.clone(), Arc::new(NoStatistics), PlannerConfig::default())
        .unwrap()
        .with_logger(logger);

    let query = Query::new("orders").with_filter(Filter::in_list("amount", 0..250i64));
    let selected = selector.select(&query).unwrap();
    assert_eq!(selected.plan.plan_type(), "FullScan");
    assert!(matches!(selected.plan.as_ref(), Plan::Filter { .. }));
    assert_eq!(selected.candidates, 1);

    let events = buffer.events_named("IN_LIST_TOO_LONG");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["values"], "250");
    assert_eq!(events[0]["max_in_values"], "100");

    let got = ids(&run(&selected.plan, &catalog, &store, "orders"));
    let expected: Vec<i64> = (0..4000i64).filter(|i| (i * 7) % 500 < 250).collect();
    assert_eq!(got, expected);
}

/// A short IN list runs as batched lookups.
#[test]
fn test_short_in_list_runs_as_in_join() {
    let (catalog, store) = orders();
    let config = PlannerConfig::default().with_in_join_batch_size(8);
    let selector = selector(&catalog, Arc::new(NoStatistics), config);

    let values = [3i64, 490, 17, 250, 3];
    let query = Query::new("orders").with_filter(Filter::in_list("amount", values));
    let selected = selector.select(&query).unwrap();
    assert_eq!(selected.plan.plan_type(), "InJoin");

    let got: HashSet<i64> = ids(&run(&selected.plan, &catalog, &store, "orders"))
        .into_iter()
        .collect();
    let expected: HashSet<i64> = (0..4000i64)
        .filter(|i| values.contains(&((i * 7) % 500)))
        .collect();
    assert_eq!(got, expected);
}

// =============================================================================
// Intersection Tests
// =============================================================================

/// Two range filters matching 50 and 5000 rows: the intersection drives
/// from the 50-row side.
#[test]
fn test_intersection_driven_by_smaller_child() {
    let (catalog, store) = readings();
    let stats = analyzed(&catalog, &store, "readings", 100);
    let rt = catalog.record_type("readings").unwrap();
    let snapshot = StatisticsSnapshot::gather(stats.as_ref(), &rt, &catalog.indexes("readings"));
    assert!(snapshot.has_table_stats());

    let config = PlannerConfig::default();
    let cost = CostModel::new(config.cost);
    let logger = Logger::discard();
    let generator = CandidateGenerator::new(catalog.as_ref(), &rt, &snapshot, &cost, &config, &logger);

    let query = Query::new("readings").with_filter(Filter::and([Filter::lt("age", 50), Filter::lt("score", 50)]));
    let rewritten = rewrite(&query.filter, &config.rewrite()).unwrap();
    let candidates = generator.generate(&rewritten, &query);

    let intersection = candidates
        .iter()
        .find(|p| p.plan_type() == "Intersection")
        .expect("intersection candidate");
    let Plan::Intersection { children, merge_key } = intersection.access_path() else {
        panic!("not an intersection: {}", intersection.explain());
    };
    assert_eq!(merge_key, &None);
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].first_index_name(), Some("by_score"));
    assert_eq!(children[1].first_index_name(), Some("by_age"));

    let driver_rows = cost.estimate(&children[0], &snapshot).estimated_rows;
    let probe_rows = cost.estimate(&children[1], &snapshot).estimated_rows;
    assert!(driver_rows < probe_rows);
    assert!((probe_rows - 5000).abs() <= 1);

    let expected: Vec<i64> = (0..50i64).filter(|i| (i * 37) % 100 < 50).collect();
    assert_eq!(ids(&run(intersection, &catalog, &store, "readings")), expected);

    let selector = selector(&catalog, stats, config);
    let selected = selector.select(&query).unwrap();
    assert_eq!(selected.mode, SelectionMode::CostBased);
    let mut got = ids(&run(&selected.plan, &catalog, &store, "readings"));
    got.sort_unstable();
    assert_eq!(got, expected);
}

// =============================================================================
// Heuristic Tests
// =============================================================================

/// A brand-new table has no statistics, so any matching index beats a
/// full scan.
#[test]
fn test_new_table_prefers_index() {
    let (catalog, store) = orders();
    let (logger, buffer) = Logger::memory();
    let selector = PlanSelector::new(catalog.clone(), Arc::new(MemoryStatistics::new()), PlannerConfig::default())
        .unwrap()
        .with_logger(logger);

    let query = Query::new("orders").with_filter(Filter::eq("status", "held"));
    let selected = selector.select(&query).unwrap();
    assert_eq!(selected.mode, SelectionMode::Heuristic);
    assert_eq!(selected.plan.plan_type(), "IndexScan");
    assert_eq!(selected.plan.first_index_name(), Some("by_status"));
    assert!(!selected.plan.uses_full_scan());

    let events = buffer.events_named("PLAN_SELECTED");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["mode"], "heuristic");
    assert_eq!(selector.metrics().snapshot().plans_heuristic, 1);

    let got = ids(&run(&selected.plan, &catalog, &store, "orders"));
    assert_eq!(got.len(), 300);
    assert!(got.iter().all(|i| status_of(*i) == "held"));
}

/// Without any usable index the heuristic path still plans a full scan.
#[test]
fn test_new_table_without_index_scans() {
    let (catalog, _store) = orders();
    let selector = selector(&catalog, Arc::new(NoStatistics), PlannerConfig::default());

    let query = Query::new("orders").with_filter(Filter::ne("status", "held"));
    let selected = selector.select(&query).unwrap();
    assert_eq!(selected.mode, SelectionMode::Heuristic);
    assert_eq!(selected.plan.plan_type(), "FullScan");
}
