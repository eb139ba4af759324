//! Plan to cursor tree
//!
//! Building validates the plan against the context and compiles every
//! residual, but reads nothing: the first store access happens on the
//! first pull.

use std::sync::Arc;

use super::context::ExecuteContext;
use super::cursor::{Advance, CursorState, RecordCursor, Stateful};
use super::errors::{ExecutorError, ExecutorResult};
use super::filter::{FilterCursor, LimitCursor};
use super::in_join::InJoin;
use super::intersection::{MergeIntersection, ProbeIntersection};
use super::scan::{FullScan, IndexScan};
use super::union::{Dedup, OrderedUnion, UnorderedUnion};
use crate::filter::{CompiledFilter, Filter};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::planner::{IndexScanPlan, Plan};
use crate::schema::{FieldAccessor, IndexDescriptor, Record, SchemaError};

type Cursor<'a> = Box<dyn RecordCursor + 'a>;

impl Plan {
    /// Build a lazy cursor over the plan's output. The cursor reads the
    /// context's pinned view and so borrows the context.
    pub fn execute<'c>(&self, ctx: &'c ExecuteContext<'_>) -> ExecutorResult<Box<dyn RecordCursor + 'c>> {
        let root = build(self, ctx)?;
        Ok(Box::new(ObservedCursor::open(root, self.plan_type(), ctx)))
    }
}

fn stateful<'c, C: Advance + 'c>(inner: C, ctx: &ExecuteContext<'_>) -> Cursor<'c> {
    Box::new(Stateful::new(inner, ctx.cancellation().clone()))
}

fn build<'c>(plan: &Plan, ctx: &'c ExecuteContext<'_>) -> ExecutorResult<Cursor<'c>> {
    let record_type = ctx.record_type();
    match plan {
        Plan::FullScan { record_type: name } => {
            if name != record_type.name() {
                return Err(ExecutorError::invalid_plan(format!(
                    "Plan scans '{}' but the context reads '{}'",
                    name,
                    record_type.name()
                )));
            }
            Ok(stateful(FullScan::new(ctx.store(), name, ctx.consistency()), ctx))
        }
        Plan::IndexScan(scan) => build_index_scan(scan, ctx),
        Plan::Filter { child, residual } => {
            let child = build(child, ctx)?;
            Ok(stateful(FilterCursor::new(child, compile(residual, ctx)?, ctx.store()), ctx))
        }
        Plan::Limit { child, limit } => Ok(stateful(LimitCursor::new(build(child, ctx)?, *limit), ctx)),
        Plan::Union {
            children,
            dedup_key,
            merge_key,
        } => {
            let cursors = build_all(children, ctx)?;
            let dedup_field = dedup_key.as_deref().map(|f| accessor(f, ctx)).transpose()?;
            match merge_key {
                Some(key) => {
                    let adjacent = key.last().map(String::as_str) == dedup_key.as_deref();
                    let dedup = dedup_field.map(|f| Dedup::new(f, adjacent));
                    Ok(stateful(OrderedUnion::new(cursors, accessors(key, ctx)?, dedup), ctx))
                }
                None => {
                    let dedup = dedup_field.map(|f| Dedup::new(f, false));
                    Ok(stateful(UnorderedUnion::new(cursors, dedup), ctx))
                }
            }
        }
        Plan::Intersection { children, merge_key } => {
            if children.is_empty() {
                return Err(ExecutorError::invalid_plan("Intersection without children"));
            }
            match merge_key {
                Some(key) => {
                    let cursors = build_all(children, ctx)?;
                    Ok(stateful(MergeIntersection::new(cursors, accessors(key, ctx)?), ctx))
                }
                None => {
                    let driver = build(&children[0], ctx)?;
                    let probes = children[1..]
                        .iter()
                        .map(|child| compile(&child.matching_filter(), ctx))
                        .collect::<ExecutorResult<Vec<_>>>()?;
                    Ok(stateful(ProbeIntersection::new(driver, probes, ctx.store()), ctx))
                }
            }
        }
        Plan::InJoin {
            field,
            values,
            index,
            batch_size,
        } => {
            check_index(index, ctx)?;
            if index.leading_field() != Some(field.as_str()) {
                return Err(ExecutorError::invalid_plan(format!(
                    "Index '{}' is not led by '{}'",
                    index.name, field
                )));
            }
            if *batch_size == 0 {
                return Err(ExecutorError::invalid_plan("IN-join batch size must be at least 1"));
            }
            Ok(stateful(
                InJoin::new(
                    ctx.store(),
                    Arc::clone(index),
                    values.clone(),
                    *batch_size,
                    ctx.consistency(),
                    ctx.cancellation().clone(),
                ),
                ctx,
            ))
        }
    }
}

fn build_all<'c>(plans: &[Plan], ctx: &'c ExecuteContext<'_>) -> ExecutorResult<Vec<Cursor<'c>>> {
    plans.iter().map(|p| build(p, ctx)).collect()
}

fn build_index_scan<'c>(scan: &IndexScanPlan, ctx: &'c ExecuteContext<'_>) -> ExecutorResult<Cursor<'c>> {
    check_index(&scan.index, ctx)?;
    if scan.is_rank_scan() && !scan.index.is_rank() {
        let field = scan.index.leading_field().unwrap_or(&scan.index.name);
        return Err(ExecutorError::missing_rank_index(field));
    }
    Ok(stateful(
        IndexScan::new(
            ctx.store(),
            Arc::clone(&scan.index),
            scan.bounds.clone(),
            scan.covering,
            ctx.consistency(),
        ),
        ctx,
    ))
}

fn check_index(index: &IndexDescriptor, ctx: &ExecuteContext<'_>) -> ExecutorResult<()> {
    if index.record_type != ctx.record_type().name() {
        return Err(ExecutorError::invalid_plan(format!(
            "Index '{}' belongs to '{}', not '{}'",
            index.name,
            index.record_type,
            ctx.record_type().name()
        )));
    }
    if !index.is_plannable() {
        return Err(ExecutorError::invalid_plan(format!("Index '{}' cannot be scanned", index.name)));
    }
    Ok(())
}

fn compile(filter: &Filter, ctx: &ExecuteContext<'_>) -> ExecutorResult<CompiledFilter> {
    CompiledFilter::compile(filter, ctx.record_type(), ctx.catalog()).map_err(|err| match err {
        SchemaError::MissingRankIndex { field, .. } => ExecutorError::missing_rank_index(&field),
        other => ExecutorError::invalid_plan(other.to_string()),
    })
}

fn accessor(field: &str, ctx: &ExecuteContext<'_>) -> ExecutorResult<FieldAccessor> {
    ctx.record_type()
        .require_accessor(field)
        .cloned()
        .map_err(|err| ExecutorError::invalid_plan(err.to_string()))
}

fn accessors(fields: &[String], ctx: &ExecuteContext<'_>) -> ExecutorResult<Vec<FieldAccessor>> {
    fields.iter().map(|f| accessor(f, ctx)).collect()
}

/// Root cursor: logs the cursor lifecycle and feeds the metrics
struct ObservedCursor<'a> {
    inner: Cursor<'a>,
    logger: Logger,
    metrics: Option<Arc<MetricsRegistry>>,
    request_id: String,
    emitted: u64,
    finished: bool,
}

impl<'a> ObservedCursor<'a> {
    fn open(inner: Cursor<'a>, plan_type: &str, ctx: &ExecuteContext<'_>) -> Self {
        let request_id = ctx.request_id().to_string();
        ctx.logger().event(
            Event::CursorOpened,
            &[
                ("plan_type", plan_type),
                ("record_type", ctx.record_type().name()),
                ("request_id", &request_id),
            ],
        );
        if let Some(metrics) = ctx.metrics() {
            metrics.increment_cursors_opened();
        }
        Self {
            inner,
            logger: ctx.logger().clone(),
            metrics: ctx.metrics().cloned(),
            request_id,
            emitted: 0,
            finished: false,
        }
    }

    fn record_failure(&mut self, err: &ExecutorError) {
        if self.finished {
            return;
        }
        self.finished = true;
        let emitted = self.emitted.to_string();
        if err.is_cancelled() {
            self.logger.event(
                Event::QueryCancelled,
                &[("records", &emitted), ("request_id", &self.request_id)],
            );
            if let Some(metrics) = &self.metrics {
                metrics.increment_queries_cancelled();
            }
        } else {
            self.logger.event(
                Event::CursorAborted,
                &[
                    ("code", err.code().code()),
                    ("reason", err.message()),
                    ("records", &emitted),
                    ("request_id", &self.request_id),
                ],
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.increment_execution_errors();
        }
    }
}

impl RecordCursor for ObservedCursor<'_> {
    fn next(&mut self) -> ExecutorResult<Option<Record>> {
        match self.inner.next() {
            Ok(Some(record)) => {
                self.emitted += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.increment_records_emitted();
                }
                Ok(Some(record))
            }
            Ok(None) => {
                if !self.finished {
                    self.finished = true;
                    self.logger.event(
                        Event::CursorExhausted,
                        &[("records", &self.emitted.to_string()), ("request_id", &self.request_id)],
                    );
                }
                Ok(None)
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    fn state(&self) -> CursorState {
        self.inner.state()
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use super::*;
    use crate::executor::{CancellationToken, ExecutorErrorCode};
    use crate::filter::ComparisonOp;
    use crate::planner::ScanBounds;
    use crate::schema::{FieldType, RecordType, SchemaCatalog};
    use crate::storage::{KeyRange, MemoryStore};
    use crate::value::Value;

    fn setup() -> (Arc<SchemaCatalog>, MemoryStore) {
        let mut catalog = SchemaCatalog::new();
        let rt = catalog
            .register_record_type(
                RecordType::builder("items")
                    .field("id", FieldType::Int)
                    .field("color", FieldType::String)
                    .field("size", FieldType::Int)
                    .primary_key("id")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register_index(IndexDescriptor::value("by_color", "items", ["color"]))
            .unwrap();
        catalog
            .register_index(IndexDescriptor::value("by_size", "items", ["size"]))
            .unwrap();
        catalog
            .register_index(IndexDescriptor::rank("rank_size", "items", "size"))
            .unwrap();
        let catalog = Arc::new(catalog);
        let store = MemoryStore::new(catalog.clone()).with_rank_seed(7);
        let colors = ["red", "green", "blue"];
        let records = (0..30i64).map(|i| {
            rt.record([
                ("id", Value::Int(i)),
                ("color", Value::string(colors[(i % 3) as usize])),
                ("size", Value::Int(i % 10)),
            ])
            .unwrap()
        });
        store.insert_all("items", records).unwrap();
        (catalog, store)
    }

    fn index(catalog: &SchemaCatalog, name: &str) -> Arc<IndexDescriptor> {
        catalog.index(name).unwrap()
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r.values()[0].as_i64().unwrap()).collect()
    }

    fn run(plan: &Plan, catalog: &SchemaCatalog, store: &MemoryStore) -> Vec<i64> {
        let ctx = ExecuteContext::new(store, catalog, "items")
            .unwrap()
            .with_logger(Logger::discard());
        let result = ids(&plan.execute(&ctx).unwrap().collect_remaining().unwrap());
        result
    }

    fn scan(catalog: &SchemaCatalog, name: &str, bounds: ScanBounds, matched: Filter) -> Plan {
        Plan::IndexScan(IndexScanPlan {
            index: index(catalog, name),
            bounds,
            covering: false,
            matched: vec![matched],
        })
    }

    #[test]
    fn test_full_scan_with_residual_and_limit() {
        let (catalog, store) = setup();
        let plan = Plan::full_scan("items")
            .with_residual(Filter::eq("color", "red"))
            .with_limit(Some(3));
        assert_eq!(run(&plan, &catalog, &store), vec![0, 3, 6]);
    }

    #[test]
    fn test_index_scan_range() {
        let (catalog, store) = setup();
        let plan = scan(
            &catalog,
            "by_size",
            ScanBounds::Value(KeyRange::between(
                Vec::new(),
                Bound::Excluded(Value::Int(7)),
                Bound::Unbounded,
            )),
            Filter::gt("size", 7),
        );
        assert_eq!(run(&plan, &catalog, &store), vec![8, 18, 28, 9, 19, 29]);
    }

    #[test]
    fn test_rank_scan_window() {
        let (catalog, store) = setup();
        // sizes 0..9 three times each: size s has rank 3s
        let (start, end) = ScanBounds::rank_window(ComparisonOp::LessThan, 6).unwrap();
        let plan = scan(
            &catalog,
            "rank_size",
            ScanBounds::Rank { start, end },
            Filter::rank("size", ComparisonOp::LessThan, 6),
        );
        assert_eq!(run(&plan, &catalog, &store), vec![0, 10, 20, 1, 11, 21]);

        let plan = scan(
            &catalog,
            "rank_size",
            ScanBounds::Rank { start: 28, end: None },
            Filter::rank("size", ComparisonOp::GreaterThanOrEquals, 28),
        );
        // size 9 has rank 27, so nothing has rank 28 or above
        assert!(run(&plan, &catalog, &store).is_empty());

        let plan = scan(
            &catalog,
            "rank_size",
            ScanBounds::Rank { start: 4, end: Some(4) },
            Filter::rank("size", ComparisonOp::Equals, 4),
        );
        assert!(run(&plan, &catalog, &store).is_empty());
    }

    #[test]
    fn test_ordered_union_dedups() {
        let (catalog, store) = setup();
        let plan = Plan::Union {
            children: vec![
                scan(&catalog, "by_color", ScanBounds::Value(KeyRange::prefix(vec![Value::string("red")])), Filter::eq("color", "red")),
                scan(&catalog, "by_size", ScanBounds::Value(KeyRange::prefix(vec![Value::Int(3)])), Filter::eq("size", 3)),
            ],
            dedup_key: Some("id".into()),
            merge_key: Some(vec!["id".into()]),
        };
        let out = run(&plan, &catalog, &store);
        let expected: Vec<i64> = (0..30).filter(|i| i % 3 == 0 || i % 10 == 3).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_unordered_union_dedups() {
        let (catalog, store) = setup();
        let plan = Plan::Union {
            children: vec![
                scan(&catalog, "by_size", ScanBounds::Value(KeyRange::prefix(vec![Value::Int(3)])), Filter::eq("size", 3)),
                scan(&catalog, "by_color", ScanBounds::Value(KeyRange::prefix(vec![Value::string("red")])), Filter::eq("color", "red")),
            ],
            dedup_key: Some("id".into()),
            merge_key: None,
        };
        let mut out = run(&plan, &catalog, &store);
        out.sort_unstable();
        let expected: Vec<i64> = (0..30).filter(|i| i % 3 == 0 || i % 10 == 3).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_intersection_modes_agree() {
        let (catalog, store) = setup();
        let children = vec![
            scan(&catalog, "by_color", ScanBounds::Value(KeyRange::prefix(vec![Value::string("red")])), Filter::eq("color", "red")),
            scan(&catalog, "by_size", ScanBounds::Value(KeyRange::prefix(vec![Value::Int(3)])), Filter::eq("size", 3)),
        ];
        let merge = Plan::Intersection {
            children: children.clone(),
            merge_key: Some(vec!["id".into()]),
        };
        let probe = Plan::Intersection {
            children,
            merge_key: None,
        };
        assert_eq!(run(&merge, &catalog, &store), vec![3]);
        assert_eq!(run(&probe, &catalog, &store), vec![3]);
    }

    #[test]
    fn test_in_join_batches() {
        let (catalog, store) = setup();
        let plan = Plan::InJoin {
            field: "size".into(),
            values: vec![Value::Int(1), Value::Int(4), Value::Int(8)],
            index: index(&catalog, "by_size"),
            batch_size: 2,
        };
        assert_eq!(run(&plan, &catalog, &store), vec![1, 11, 21, 4, 14, 24, 8, 18, 28]);
    }

    #[test]
    fn test_invalid_plans() {
        let (catalog, store) = setup();
        let ctx = ExecuteContext::new(&store, catalog.as_ref(), "items")
            .unwrap()
            .with_logger(Logger::discard());

        let err = Plan::full_scan("other").execute(&ctx).err().unwrap();
        assert_eq!(err.code(), ExecutorErrorCode::RecExecInvalidPlan);

        let plan = Plan::InJoin {
            field: "size".into(),
            values: vec![Value::Int(1)],
            index: index(&catalog, "by_size"),
            batch_size: 0,
        };
        assert_eq!(plan.execute(&ctx).err().unwrap().code(), ExecutorErrorCode::RecExecInvalidPlan);

        let plan = scan(&catalog, "by_size", ScanBounds::Rank { start: 0, end: None }, Filter::always());
        assert_eq!(
            plan.execute(&ctx).err().unwrap().code(),
            ExecutorErrorCode::RecExecMissingRankIndex
        );

        let plan = Plan::full_scan("items").with_residual(Filter::rank("color", ComparisonOp::LessThan, 2));
        assert_eq!(
            plan.execute(&ctx).err().unwrap().code(),
            ExecutorErrorCode::RecExecMissingRankIndex
        );
    }

    #[test]
    fn test_observed_cursor_logs_and_counts() {
        let (catalog, store) = setup();
        let (logger, buffer) = Logger::memory();
        let metrics = Arc::new(MetricsRegistry::new());
        let ctx = ExecuteContext::new(&store, catalog.as_ref(), "items")
            .unwrap()
            .with_logger(logger)
            .with_metrics(Arc::clone(&metrics));

        let mut cursor = Plan::full_scan("items").with_limit(Some(4)).execute(&ctx).unwrap();
        assert_eq!(cursor.collect_remaining().unwrap().len(), 4);
        assert_eq!(cursor.state(), CursorState::Exhausted);

        let opened = buffer.events_named("CURSOR_OPENED");
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0]["request_id"], ctx.request_id().to_string());
        assert_eq!(buffer.events_named("CURSOR_EXHAUSTED")[0]["records"], "4");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cursors_opened, 1);
        assert_eq!(snapshot.records_emitted, 4);
    }

    #[test]
    fn test_cancelled_cursor_logged_once() {
        let (catalog, store) = setup();
        let (logger, buffer) = Logger::memory();
        let token = CancellationToken::new();
        let ctx = ExecuteContext::new(&store, catalog.as_ref(), "items")
            .unwrap()
            .with_logger(logger)
            .with_cancellation(token.clone());

        let mut cursor = Plan::full_scan("items").execute(&ctx).unwrap();
        assert!(cursor.next().unwrap().is_some());
        token.cancel();
        assert!(cursor.next().unwrap_err().is_cancelled());
        assert_eq!(
            cursor.next().unwrap_err().code(),
            ExecutorErrorCode::RecExecCursorAborted
        );
        assert_eq!(buffer.events_named("QUERY_CANCELLED").len(), 1);
        assert!(buffer.events_named("CURSOR_ABORTED").is_empty());
    }
}
