//! Plan selection
//!
//! Planning runs in two phases. The fetch phase validates the query,
//! consults the plan cache, rewrites the filter and gathers a statistics
//! snapshot. The compute phase generates candidates, scores them and
//! picks one: by minimum cost when table statistics exist, by ordered
//! heuristics otherwise.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::cache::{CacheError, PlanCache};
use super::config::PlannerConfig;
use super::errors::{PlannerError, PlannerResult};
use super::explain::ExplainPlan;
use super::generator::CandidateGenerator;
use super::plan::Plan;
use super::query::Query;
use crate::cost::{CostModel, QueryCost};
use crate::filter::Fingerprint;
use crate::observability::{Event, Logger, MetricsRegistry, ObservationScope};
use crate::rewriter::rewrite;
use crate::schema::{IndexCatalog, IndexDescriptor};
use crate::stats::{StatisticsSnapshot, StatisticsSource};

/// How a plan was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Minimum estimated cost over the candidates
    CostBased,
    /// Ordered heuristics, for record types without table statistics
    Heuristic,
    /// Served from the plan cache
    Cached,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::CostBased => "cost_based",
            SelectionMode::Heuristic => "heuristic",
            SelectionMode::Cached => "cached",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of [`PlanSelector::select`].
#[derive(Debug, Clone)]
pub struct SelectedPlan {
    pub plan: Arc<Plan>,
    pub cost: QueryCost,
    pub fingerprint: Fingerprint,
    pub cache_hit: bool,
    /// Candidates considered; zero on a cache hit
    pub candidates: usize,
    pub mode: SelectionMode,
}

/// Chooses a plan per query.
///
/// `Send + Sync`; the only shared mutable state is the injected cache.
pub struct PlanSelector {
    catalog: Arc<dyn IndexCatalog + Send + Sync>,
    statistics: Arc<dyn StatisticsSource>,
    config: PlannerConfig,
    cost_model: CostModel,
    cache: Arc<PlanCache>,
    logger: Logger,
    metrics: Arc<MetricsRegistry>,
}

impl PlanSelector {
    /// Selector with a private cache sized by the configuration
    pub fn new(
        catalog: Arc<dyn IndexCatalog + Send + Sync>,
        statistics: Arc<dyn StatisticsSource>,
        config: PlannerConfig,
    ) -> PlannerResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            statistics,
            cost_model: CostModel::new(config.cost.clone()),
            cache: Arc::new(PlanCache::new(config.plan_cache_capacity)),
            logger: config.console_logger(),
            metrics: Arc::new(MetricsRegistry::new()),
            config,
        })
    }

    /// Share a cache between selectors
    pub fn with_cache(mut self, cache: Arc<PlanCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PlanCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Drop cached plans, e.g. after statistics are refreshed
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// Choose a plan for `query`
    ///
    /// Failures are logged once, as the scope's `PLANNING_FAILED` line.
    pub fn select(&self, query: &Query) -> PlannerResult<SelectedPlan> {
        let scope = ObservationScope::with_fields(&self.logger, "PLANNING", &[("record_type", &query.record_type)]);

        match self.fingerprint_and_plan(query) {
            Ok(selected) => {
                let fp_text = selected.fingerprint.to_string();
                scope.complete_with_fields(&[
                    ("fingerprint", &fp_text),
                    ("plan_type", selected.plan.plan_type()),
                ]);
                Ok(selected)
            }
            Err((err, fingerprint)) => {
                self.metrics.increment_planning_failures();
                let fp_text = fingerprint.map(|fp| fp.to_string());
                let mut fields = vec![("code", err.code().code()), ("reason", err.message())];
                if let Some(fp) = &fp_text {
                    fields.push(("fingerprint", fp.as_str()));
                }
                scope.fail_with_fields(&fields);
                Err(err)
            }
        }
    }

    /// Explain report for `query`; planning errors become rejections
    pub fn explain(&self, query: &Query) -> ExplainPlan {
        match self.select(query) {
            Ok(selected) => ExplainPlan::from_selection(query, &selected),
            Err(err) => {
                let fingerprint = query
                    .check_depth(self.config.max_depth)
                    .ok()
                    .map(|()| query.fingerprint());
                ExplainPlan::from_error(query, fingerprint, &err)
            }
        }
    }

    /// Depth check, then fingerprint, then plan. The fingerprint is
    /// returned with the error once it exists.
    fn fingerprint_and_plan(&self, query: &Query) -> Result<SelectedPlan, (PlannerError, Option<Fingerprint>)> {
        query
            .check_depth(self.config.max_depth)
            .map_err(|err| (err, None))?;
        let fingerprint = query.fingerprint();
        self.plan_query(query, fingerprint)
            .map_err(|err| (err, Some(fingerprint)))
    }

    fn plan_query(&self, query: &Query, fingerprint: Fingerprint) -> PlannerResult<SelectedPlan> {
        let record_type = query.validate(self.catalog.as_ref())?;
        let canonical = query.canonical_text();
        let fp_text = fingerprint.to_string();

        match self.cache.get(&fingerprint, &canonical) {
            Ok(Some(entry)) => {
                self.metrics.increment_cache_hits();
                self.logger.event(Event::PlanCacheHit, &[("fingerprint", &fp_text)]);
                let selected = SelectedPlan {
                    plan: Arc::clone(&entry.plan),
                    cost: entry.cost,
                    fingerprint,
                    cache_hit: true,
                    candidates: 0,
                    mode: SelectionMode::Cached,
                };
                self.log_selected(query, &selected);
                return Ok(selected);
            }
            Ok(None) => {
                self.metrics.increment_cache_misses();
                self.logger.event(Event::PlanCacheMiss, &[("fingerprint", &fp_text)]);
            }
            Err(err @ CacheError::Collision { .. }) => {
                self.metrics.increment_cache_collisions();
                self.metrics.increment_cache_misses();
                self.logger.event(
                    Event::PlanCacheCollision,
                    &[("fingerprint", &fp_text), ("reason", &err.to_string())],
                );
            }
        }

        // fetch phase
        let rewritten = rewrite(&query.filter, &self.config.rewrite())?;
        if rewritten.dnf_skipped {
            self.metrics.increment_dnf_skipped();
            self.logger.event(
                Event::DnfSkipped,
                &[
                    ("estimated_terms", &rewritten.estimated_terms.to_string()),
                    ("max_dnf_terms", &self.config.max_dnf_terms.to_string()),
                ],
            );
        }

        let indexes: Vec<Arc<IndexDescriptor>> = self
            .catalog
            .indexes(record_type.name())
            .into_iter()
            .filter(|idx| idx.is_plannable())
            .collect();
        let snapshot = StatisticsSnapshot::gather(self.statistics.as_ref(), &record_type, &indexes);
        for rejected in snapshot.rejected() {
            self.metrics.increment_estimation_fallbacks();
            self.logger.event(
                Event::StatisticsRejected,
                &[("reason", &rejected.to_string()), ("subject", rejected.subject())],
            );
        }

        // compute phase
        let generator = CandidateGenerator::new(
            self.catalog.as_ref(),
            &record_type,
            &snapshot,
            &self.cost_model,
            &self.config,
            &self.logger,
        );
        let candidates = generator.generate(&rewritten, query);
        let cost_based = snapshot.has_table_stats();
        let chosen = if cost_based {
            candidates.iter().min_by(|a, b| generator.compare(a, b))
        } else {
            candidates.iter().min_by(|a, b| heuristic_order(a, b))
        }
        .cloned()
        .ok_or_else(|| PlannerError::no_matching_index(record_type.name()))?;

        let cost = self.cost_model.estimate(&chosen, &snapshot);
        let plan = Arc::new(chosen);
        if let Some(evicted) = self.cache.insert(fingerprint, canonical, Arc::clone(&plan), cost) {
            self.metrics.increment_cache_evictions();
            self.logger
                .event(Event::PlanCacheEvicted, &[("fingerprint", &evicted.to_string())]);
        }

        let selected = SelectedPlan {
            plan,
            cost,
            fingerprint,
            cache_hit: false,
            candidates: candidates.len(),
            mode: if cost_based {
                SelectionMode::CostBased
            } else {
                SelectionMode::Heuristic
            },
        };
        self.metrics.increment_plans_selected(cost_based);
        self.log_selected(query, &selected);
        Ok(selected)
    }

    fn log_selected(&self, query: &Query, selected: &SelectedPlan) {
        self.logger.event(
            Event::PlanSelected,
            &[
                ("cache_hit", if selected.cache_hit { "true" } else { "false" }),
                ("candidates", &selected.candidates.to_string()),
                ("estimated_rows", &selected.cost.estimated_rows.to_string()),
                ("fingerprint", &selected.fingerprint.to_string()),
                ("mode", selected.mode.as_str()),
                ("plan_type", selected.plan.plan_type()),
                ("record_type", &query.record_type),
                ("total_cost", &format!("{:.2}", selected.cost.total())),
            ],
        );
    }
}

/// Preference without statistics: combined index plans, then single
/// index scans, then full scans
fn heuristic_rank(plan: &Plan) -> u8 {
    match plan.plan_type() {
        "Intersection" => 0,
        "Union" => 1,
        "InJoin" => 2,
        "IndexScan" | "RankScan" => 3,
        _ => 4,
    }
}

fn heuristic_order(a: &Plan, b: &Plan) -> Ordering {
    heuristic_rank(a)
        .cmp(&heuristic_rank(b))
        .then_with(|| a.first_index_name().cmp(&b.first_index_name()))
        .then_with(|| a.explain().cmp(&b.explain()))
}
