//! Rewrite Property Tests
//!
//! Randomized checks for the filter rewriter and fingerprints:
//! - Normalization and DNF expansion never change which records match
//! - Reordering AND/OR children or IN values keeps the fingerprint

use std::sync::Arc;

use proptest::prelude::*;
use recordplan::filter::{canonical_text, ComparisonOp, CompiledFilter, Filter};
use recordplan::planner::Query;
use recordplan::rewriter::{rewrite, RewriteConfig};
use recordplan::schema::{FieldType, IndexDescriptor, Record, RecordType, SchemaCatalog};
use recordplan::storage::{MemoryStore, ReadConsistency, RecordStore};
use recordplan::value::Value;

// =============================================================================
// Fixture
// =============================================================================

const FIELDS: [&str; 3] = ["a", "b", "c"];

struct Fixture {
    catalog: Arc<SchemaCatalog>,
    record_type: Arc<RecordType>,
    store: MemoryStore,
    records: Vec<Record>,
}

fn fixture() -> Fixture {
    let mut catalog = SchemaCatalog::new();
    let record_type = catalog
        .register_record_type(
            RecordType::builder("rows")
                .field("id", FieldType::Int)
                .field("a", FieldType::Int)
                .field("b", FieldType::Int)
                .field("c", FieldType::Int)
                .primary_key("id")
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register_index(IndexDescriptor::rank("rank_a", "rows", "a"))
        .unwrap();
    let catalog = Arc::new(catalog);
    let store = MemoryStore::new(catalog.clone()).with_rank_seed(3);
    let rows = (0..40i64).map(|i| {
        record_type
            .record([
                ("id", Value::Int(i)),
                ("a", Value::Int(i % 5)),
                ("b", Value::Int((i * 3) % 7)),
                ("c", Value::Int((i * 7) % 4)),
            ])
            .unwrap()
    });
    store.insert_all("rows", rows).unwrap();
    let records = store
        .scan_records("rows", ReadConsistency::Snapshot)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    Fixture {
        catalog,
        record_type,
        store,
        records,
    }
}

impl Fixture {
    /// Ids of the records `filter` accepts
    fn matching(&self, filter: &Filter) -> Vec<i64> {
        let compiled = CompiledFilter::compile(filter, &self.record_type, self.catalog.as_ref()).unwrap();
        let store: &dyn RecordStore = &self.store;
        self.records
            .iter()
            .filter(|r| compiled.matches(r, store).unwrap())
            .map(|r| r.values()[0].as_i64().unwrap())
            .collect()
    }
}

// =============================================================================
// Strategies
// =============================================================================

fn arb_field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(FIELDS[0].to_string()),
        Just(FIELDS[1].to_string()),
        Just(FIELDS[2].to_string()),
    ]
}

fn arb_op() -> impl Strategy<Value = ComparisonOp> {
    prop_oneof![
        Just(ComparisonOp::Equals),
        Just(ComparisonOp::NotEquals),
        Just(ComparisonOp::LessThan),
        Just(ComparisonOp::LessThanOrEquals),
        Just(ComparisonOp::GreaterThan),
        Just(ComparisonOp::GreaterThanOrEquals),
    ]
}

fn arb_filter() -> impl Strategy<Value = Filter> {
    let leaf = prop_oneof![
        4 => (arb_field(), arb_op(), 0i64..8).prop_map(|(f, op, v)| Filter::compare(f, op, v)),
        2 => (arb_field(), prop::collection::vec(0i64..8, 1..4)).prop_map(|(f, vs)| Filter::in_list(f, vs)),
        1 => (arb_op(), 0u64..45).prop_map(|(op, r)| Filter::rank("a", op, r)),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(|c| Filter::and(c)),
            prop::collection::vec(inner.clone(), 1..4).prop_map(|c| Filter::or(c)),
            inner.prop_map(Filter::not),
        ]
    })
}

fn reversed(filter: &Filter) -> Filter {
    match filter {
        Filter::And(children) => Filter::and(children.iter().rev().map(reversed)),
        Filter::Or(children) => Filter::or(children.iter().rev().map(reversed)),
        Filter::Not(child) => Filter::not(reversed(child)),
        Filter::InList { field, values } => Filter::in_list(field.clone(), values.iter().rev().cloned()),
        leaf => leaf.clone(),
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn rewrite_preserves_matches(filter in arb_filter()) {
        let fixture = fixture();
        let expected = fixture.matching(&filter);
        let rewritten = rewrite(&filter, &RewriteConfig::default()).unwrap();

        prop_assert_eq!(&fixture.matching(&rewritten.filter), &expected);
        if let Some(dnf) = &rewritten.dnf {
            prop_assert_eq!(&fixture.matching(dnf), &expected);
        }
    }

    #[test]
    fn small_term_budget_still_preserves_matches(filter in arb_filter()) {
        let fixture = fixture();
        let config = RewriteConfig::default().with_max_dnf_terms(2);
        let rewritten = rewrite(&filter, &config).unwrap();
        if rewritten.dnf_skipped {
            prop_assert!(rewritten.dnf.is_none());
        }
        prop_assert_eq!(fixture.matching(&rewritten.filter), fixture.matching(&filter));
    }

    #[test]
    fn fingerprint_ignores_child_order(filter in arb_filter(), limit in prop::option::of(1usize..50)) {
        let flipped = reversed(&filter);
        prop_assert_eq!(canonical_text(&filter), canonical_text(&flipped));

        let mut query = Query::new("rows").with_filter(filter);
        let mut other = Query::new("rows").with_filter(flipped);
        if let Some(limit) = limit {
            query = query.with_limit(limit);
            other = other.with_limit(limit);
        }
        prop_assert_eq!(query.fingerprint(), other.fingerprint());
    }

    #[test]
    fn rewrite_is_idempotent(filter in arb_filter()) {
        let config = RewriteConfig::default();
        let once = rewrite(&filter, &config).unwrap();
        let twice = rewrite(&once.filter, &config).unwrap();
        prop_assert_eq!(canonical_text(&twice.filter), canonical_text(&once.filter));
    }
}
