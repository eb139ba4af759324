//! Plan Cache and Configuration Tests
//!
//! Tests for plan reuse through the selector:
//! - Equivalent queries share one cache entry
//! - The least recently used plan is evicted first
//! - Fingerprint collisions are treated as misses
//! - Configuration files are loaded and validated

use std::io::Write;
use std::sync::Arc;
use std::thread;

use recordplan::filter::Filter;
use recordplan::observability::Logger;
use recordplan::planner::{
    Plan, PlanCache, PlanSelector, PlannerConfig, PlannerErrorCode, Query, SelectionMode,
};
use recordplan::schema::{FieldType, IndexDescriptor, RecordType, SchemaCatalog};
use recordplan::stats::NoStatistics;
use tempfile::NamedTempFile;

// =============================================================================
// Helper Functions
// =============================================================================

fn catalog() -> Arc<SchemaCatalog> {
    let mut catalog = SchemaCatalog::new();
    catalog
        .register_record_type(
            RecordType::builder("users")
                .field("id", FieldType::Int)
                .field("name", FieldType::String)
                .field("age", FieldType::Int)
                .primary_key("id")
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register_index(IndexDescriptor::value("by_age", "users", ["age"]))
        .unwrap();
    catalog
        .register_index(IndexDescriptor::value("by_name", "users", ["name"]))
        .unwrap();
    Arc::new(catalog)
}

fn by_age(age: i64) -> Query {
    Query::new("users").with_filter(Filter::eq("age", age))
}

// =============================================================================
// Reuse Tests
// =============================================================================

/// Reordered conjuncts hit the entry cached for the original order.
#[test]
fn test_equivalent_queries_share_entry() {
    let selector = PlanSelector::new(catalog(), Arc::new(NoStatistics), PlannerConfig::default())
        .unwrap()
        .with_logger(Logger::discard());

    let first = Query::new("users").with_filter(Filter::and([Filter::eq("age", 30), Filter::eq("name", "ada")]));
    let second = Query::new("users").with_filter(Filter::and([Filter::eq("name", "ada"), Filter::eq("age", 30)]));
    assert_eq!(first.fingerprint(), second.fingerprint());

    let miss = selector.select(&first).unwrap();
    let hit = selector.select(&second).unwrap();
    assert!(!miss.cache_hit);
    assert!(hit.cache_hit);
    assert_eq!(hit.mode, SelectionMode::Cached);
    assert!(Arc::ptr_eq(&miss.plan, &hit.plan));

    let metrics = selector.metrics().snapshot();
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.plans_selected, 1);
}

/// A different limit is a different query.
#[test]
fn test_limit_changes_fingerprint() {
    let selector = PlanSelector::new(catalog(), Arc::new(NoStatistics), PlannerConfig::default())
        .unwrap()
        .with_logger(Logger::discard());

    selector.select(&by_age(30)).unwrap();
    let limited = selector.select(&by_age(30).with_limit(5)).unwrap();
    assert!(!limited.cache_hit);
    assert!(matches!(limited.plan.as_ref(), Plan::Limit { limit: 5, .. }));
    assert_eq!(selector.cache().len(), 2);
}

/// Invalidation forces the next lookup to plan again.
#[test]
fn test_invalidate_cache() {
    let selector = PlanSelector::new(catalog(), Arc::new(NoStatistics), PlannerConfig::default())
        .unwrap()
        .with_logger(Logger::discard());

    selector.select(&by_age(1)).unwrap();
    selector.invalidate_cache();
    assert!(selector.cache().is_empty());
    assert!(!selector.select(&by_age(1)).unwrap().cache_hit);
}

// =============================================================================
// Eviction Tests
// =============================================================================

/// With room for two plans, the least recently used one goes first.
#[test]
fn test_lru_eviction() {
    let (logger, buffer) = Logger::memory();
    let config = PlannerConfig::default().with_plan_cache_capacity(2);
    let selector = PlanSelector::new(catalog(), Arc::new(NoStatistics), config)
        .unwrap()
        .with_logger(logger);

    selector.select(&by_age(1)).unwrap();
    selector.select(&by_age(2)).unwrap();
    assert!(selector.select(&by_age(1)).unwrap().cache_hit);

    selector.select(&by_age(3)).unwrap();
    assert_eq!(selector.cache().len(), 2);

    let evicted = buffer.events_named("PLAN_CACHE_EVICTED");
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0]["fingerprint"], by_age(2).fingerprint().to_string());

    assert!(selector.select(&by_age(1)).unwrap().cache_hit);
    assert!(!selector.select(&by_age(2)).unwrap().cache_hit);
    assert_eq!(selector.metrics().snapshot().cache_evictions, 2);
}

// =============================================================================
// Collision Tests
// =============================================================================

/// An entry stored under the query's fingerprint for other text is not
/// reused; the fresh plan replaces it.
#[test]
fn test_collision_is_a_miss() {
    let cache = Arc::new(PlanCache::new(8));
    let (logger, buffer) = Logger::memory();
    let selector = PlanSelector::new(catalog(), Arc::new(NoStatistics), PlannerConfig::default())
        .unwrap()
        .with_cache(cache.clone())
        .with_logger(logger);

    let query = by_age(42);
    let decoy = Arc::new(Plan::full_scan("users"));
    let cost = recordplan::cost::QueryCost::new(1.0, 1.0, 1.0);
    cache.insert(query.fingerprint(), "users WHERE somebody else".to_string(), decoy, cost);

    let selected = selector.select(&query).unwrap();
    assert!(!selected.cache_hit);
    assert_eq!(selected.plan.plan_type(), "IndexScan");
    assert_eq!(buffer.events_named("PLAN_CACHE_COLLISION").len(), 1);

    let metrics = selector.metrics().snapshot();
    assert_eq!(metrics.cache_collisions, 1);
    assert_eq!(metrics.cache_misses, 1);

    assert!(selector.select(&query).unwrap().cache_hit);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

/// Selectors sharing a cache from several threads agree on the plan.
#[test]
fn test_shared_cache_across_threads() {
    let cache = Arc::new(PlanCache::new(16));
    let catalog = catalog();
    let selectors: Vec<PlanSelector> = (0..4)
        .map(|_| {
            PlanSelector::new(catalog.clone(), Arc::new(NoStatistics), PlannerConfig::default())
                .unwrap()
                .with_cache(cache.clone())
                .with_logger(Logger::discard())
        })
        .collect();

    let explains: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = selectors
            .iter()
            .map(|selector| {
                scope.spawn(move || {
                    (0..50)
                        .map(|i| selector.select(&by_age(i % 5)).unwrap().plan.explain())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert_eq!(explains.len(), 200);
    assert!(explains.iter().all(|e| e.starts_with("IndexScan(by_age, [")));
    assert_eq!(cache.len(), 5);
}

// =============================================================================
// Configuration Tests
// =============================================================================

/// A partial config file keeps defaults for everything it omits.
#[test]
fn test_load_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"max_in_values": 3, "plan_cache_capacity": 4, "log_level": "warn"}}"#).unwrap();

    let (logger, buffer) = Logger::memory();
    let config = PlannerConfig::load_logged(file.path(), &logger).unwrap();
    assert_eq!(config.max_in_values, 3);
    assert_eq!(config.plan_cache_capacity, 4);
    assert_eq!(config.max_dnf_terms, 100);

    let loaded = buffer.events_named("CONFIG_LOADED");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0]["max_in_values"], "3");
    assert_eq!(loaded[0]["log_level"], "warn");

    let selector = PlanSelector::new(catalog(), Arc::new(NoStatistics), config).unwrap();
    assert_eq!(selector.cache().capacity(), 4);
}

/// Unreadable or invalid files are rejected with a config error.
#[test]
fn test_bad_config_rejected() {
    let missing = std::env::temp_dir().join("recordplan-no-such-config.json");
    let err = PlannerConfig::load(&missing).unwrap_err();
    assert_eq!(err.code(), PlannerErrorCode::RecPlanInvalidConfig);

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"in_join_batch_size": 0}}"#).unwrap();
    let err = PlannerConfig::load(file.path()).unwrap_err();
    assert_eq!(err.code(), PlannerErrorCode::RecPlanInvalidConfig);

    let err = PlanSelector::new(catalog(), Arc::new(NoStatistics), PlannerConfig::default().with_max_depth(0))
        .err()
        .unwrap();
    assert_eq!(err.code(), PlannerErrorCode::RecPlanInvalidConfig);
}
