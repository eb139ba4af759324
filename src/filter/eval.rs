//! Predicate evaluation against records
//!
//! A filter is compiled once per plan against the record type: every
//! field name resolves to its registered accessor, IN lists become hash
//! sets and rank leaves find their rank index. Evaluation then reads
//! record values by position.

use std::collections::HashSet;
use std::sync::Arc;

use super::ast::{ComparisonOp, Filter};
use crate::schema::{
    FieldAccessor, IndexCatalog, IndexDescriptor, Record, RecordType, SchemaError, SchemaResult,
};
use crate::storage::{RecordStore, StoreResult};
use crate::value::Value;

/// Source of competition ranks for rank predicates
pub trait RankLookup {
    /// Number of values in the rank index strictly less than `value`
    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64>;
}

impl<S: RecordStore + ?Sized> RankLookup for S {
    fn rank_of(&self, index: &IndexDescriptor, value: &Value) -> StoreResult<u64> {
        RecordStore::rank_of(self, index, value)
    }
}

#[derive(Debug)]
enum Node {
    Compare {
        accessor: FieldAccessor,
        op: ComparisonOp,
        value: Value,
    },
    In {
        accessor: FieldAccessor,
        values: HashSet<Value>,
    },
    Rank {
        accessor: FieldAccessor,
        index: Arc<IndexDescriptor>,
        op: ComparisonOp,
        rank: u64,
    },
    Not(Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
}

/// A filter bound to one record type.
#[derive(Debug)]
pub struct CompiledFilter {
    root: Node,
    source: Filter,
}

/// Find the rank index serving `field`
pub fn rank_index_for(
    catalog: &dyn IndexCatalog,
    record_type: &RecordType,
    field: &str,
) -> SchemaResult<Arc<IndexDescriptor>> {
    catalog
        .indexes_for_field(record_type.name(), field)
        .into_iter()
        .find(|idx| idx.is_rank())
        .ok_or_else(|| SchemaError::MissingRankIndex {
            record_type: record_type.name().to_string(),
            field: field.to_string(),
        })
}

impl CompiledFilter {
    /// Resolve every field of `filter` against the record type
    pub fn compile(
        filter: &Filter,
        record_type: &RecordType,
        catalog: &dyn IndexCatalog,
    ) -> SchemaResult<Self> {
        Ok(Self {
            root: Self::compile_node(filter, record_type, catalog)?,
            source: filter.clone(),
        })
    }

    fn compile_node(
        filter: &Filter,
        record_type: &RecordType,
        catalog: &dyn IndexCatalog,
    ) -> SchemaResult<Node> {
        let node = match filter {
            Filter::Comparison { field, op, value } => Node::Compare {
                accessor: record_type.require_accessor(field)?.clone(),
                op: *op,
                value: value.clone(),
            },
            Filter::InList { field, values } => Node::In {
                accessor: record_type.require_accessor(field)?.clone(),
                values: values.iter().cloned().collect(),
            },
            Filter::Rank { field, op, rank } => Node::Rank {
                accessor: record_type.require_accessor(field)?.clone(),
                index: rank_index_for(catalog, record_type, field)?,
                op: *op,
                rank: *rank,
            },
            Filter::Not(child) => Node::Not(Box::new(Self::compile_node(child, record_type, catalog)?)),
            Filter::And(children) => Node::And(
                children
                    .iter()
                    .map(|c| Self::compile_node(c, record_type, catalog))
                    .collect::<SchemaResult<_>>()?,
            ),
            Filter::Or(children) => Node::Or(
                children
                    .iter()
                    .map(|c| Self::compile_node(c, record_type, catalog))
                    .collect::<SchemaResult<_>>()?,
            ),
        };
        Ok(node)
    }

    /// The filter this was compiled from
    pub fn source(&self) -> &Filter {
        &self.source
    }

    /// Whether the record satisfies the filter.
    ///
    /// Only rank leaves touch `ranks`; other leaves never fail.
    pub fn matches<R: RankLookup + ?Sized>(&self, record: &Record, ranks: &R) -> StoreResult<bool> {
        Self::eval(&self.root, record, ranks)
    }

    fn eval<R: RankLookup + ?Sized>(node: &Node, record: &Record, ranks: &R) -> StoreResult<bool> {
        match node {
            Node::Compare { accessor, op, value } => Ok(op.test(accessor.get(record), value)),
            Node::In { accessor, values } => Ok(values.contains(accessor.get(record))),
            Node::Rank {
                accessor,
                index,
                op,
                rank,
            } => {
                let actual = ranks.rank_of(index, accessor.get(record))?;
                Ok(op.test(&actual, rank))
            }
            Node::Not(child) => Ok(!Self::eval(child, record, ranks)?),
            Node::And(children) => {
                for child in children {
                    if !Self::eval(child, record, ranks)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Node::Or(children) => {
                for child in children {
                    if Self::eval(child, record, ranks)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::RankedSet;
    use crate::schema::{FieldType, SchemaCatalog};

    struct SetRanks(RankedSet<Value>);

    impl RankLookup for SetRanks {
        fn rank_of(&self, _: &IndexDescriptor, value: &Value) -> StoreResult<u64> {
            Ok(self.0.rank(value) as u64)
        }
    }

    fn catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new();
        catalog
            .register_record_type(
                RecordType::builder("players")
                    .field("id", FieldType::Int)
                    .field("team", FieldType::String)
                    .field("score", FieldType::Int)
                    .primary_key("id")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register_index(IndexDescriptor::rank("by_score", "players", "score"))
            .unwrap();
        catalog
    }

    fn player(catalog: &SchemaCatalog, id: i64, team: &str, score: i64) -> Record {
        catalog
            .record_type("players")
            .unwrap()
            .record([
                ("id", Value::Int(id)),
                ("team", Value::from(team)),
                ("score", Value::Int(score)),
            ])
            .unwrap()
    }

    fn ranks(scores: &[i64]) -> SetRanks {
        let mut set = RankedSet::with_seed(1);
        for s in scores {
            set.insert(Value::Int(*s));
        }
        SetRanks(set)
    }

    #[test]
    fn test_comparison_and_boolean_nodes() {
        let catalog = catalog();
        let rt = catalog.record_type("players").unwrap();
        let filter = Filter::and([
            Filter::eq("team", "red"),
            Filter::or([Filter::lt("score", 10), Filter::not(Filter::le("score", 90))]),
        ]);
        let compiled = CompiledFilter::compile(&filter, &rt, &catalog).unwrap();
        let none = ranks(&[]);

        assert!(compiled.matches(&player(&catalog, 1, "red", 5), &none).unwrap());
        assert!(compiled.matches(&player(&catalog, 2, "red", 95), &none).unwrap());
        assert!(!compiled.matches(&player(&catalog, 3, "red", 50), &none).unwrap());
        assert!(!compiled.matches(&player(&catalog, 4, "blue", 5), &none).unwrap());
    }

    #[test]
    fn test_in_list() {
        let catalog = catalog();
        let rt = catalog.record_type("players").unwrap();
        let compiled = CompiledFilter::compile(&Filter::in_list("team", ["a", "b"]), &rt, &catalog).unwrap();
        let none = ranks(&[]);
        assert!(compiled.matches(&player(&catalog, 1, "b", 0), &none).unwrap());
        assert!(!compiled.matches(&player(&catalog, 1, "c", 0), &none).unwrap());
    }

    #[test]
    fn test_missing_field_reads_null() {
        let catalog = catalog();
        let rt = catalog.record_type("players").unwrap();
        let record = rt.record([("id", Value::Int(1))]).unwrap();
        let compiled = CompiledFilter::compile(&Filter::lt("score", 0), &rt, &catalog).unwrap();
        // Null sorts before every Int
        assert!(compiled.matches(&record, &ranks(&[])).unwrap());
    }

    #[test]
    fn test_rank_leaf() {
        let catalog = catalog();
        let rt = catalog.record_type("players").unwrap();
        let lookup = ranks(&[10, 20, 20, 30]);
        let top_two = CompiledFilter::compile(
            &Filter::rank("score", ComparisonOp::LessThan, 2),
            &rt,
            &catalog,
        )
        .unwrap();

        assert!(top_two.matches(&player(&catalog, 1, "x", 10), &lookup).unwrap());
        // ties share rank 1
        assert!(top_two.matches(&player(&catalog, 2, "x", 20), &lookup).unwrap());
        assert!(!top_two.matches(&player(&catalog, 3, "x", 30), &lookup).unwrap());
    }

    #[test]
    fn test_compile_errors() {
        let catalog = catalog();
        let rt = catalog.record_type("players").unwrap();
        assert!(matches!(
            CompiledFilter::compile(&Filter::eq("nope", 1), &rt, &catalog),
            Err(SchemaError::UnknownField { .. })
        ));
        assert!(matches!(
            CompiledFilter::compile(&Filter::rank("team", ComparisonOp::Equals, 0), &rt, &catalog),
            Err(SchemaError::MissingRankIndex { .. })
        ));
    }
}
