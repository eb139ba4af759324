//! Planner and executor counters
//!
//! - Counters only, monotonic
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of operational counters.
///
/// All counters use Relaxed atomics; they are observed, never used for
/// synchronization.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    plans_selected: AtomicU64,
    plans_cost_based: AtomicU64,
    plans_heuristic: AtomicU64,
    planning_failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_evictions: AtomicU64,
    cache_collisions: AtomicU64,
    estimation_fallbacks: AtomicU64,
    dnf_skipped: AtomicU64,
    cursors_opened: AtomicU64,
    records_emitted: AtomicU64,
    execution_errors: AtomicU64,
    queries_cancelled: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Planning

    pub fn increment_plans_selected(&self, cost_based: bool) {
        self.plans_selected.fetch_add(1, Ordering::Relaxed);
        if cost_based {
            self.plans_cost_based.fetch_add(1, Ordering::Relaxed);
        } else {
            self.plans_heuristic.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_planning_failures(&self) {
        self.planning_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_estimation_fallbacks(&self) {
        self.estimation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dnf_skipped(&self) {
        self.dnf_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // Plan cache

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_evictions(&self) {
        self.cache_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_collisions(&self) {
        self.cache_collisions.fetch_add(1, Ordering::Relaxed);
    }

    // Execution

    pub fn increment_cursors_opened(&self) {
        self.cursors_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_execution_errors(&self) {
        self.execution_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_cancelled(&self) {
        self.queries_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plans_selected: self.plans_selected.load(Ordering::Relaxed),
            plans_cost_based: self.plans_cost_based.load(Ordering::Relaxed),
            plans_heuristic: self.plans_heuristic.load(Ordering::Relaxed),
            planning_failures: self.planning_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            cache_collisions: self.cache_collisions.load(Ordering::Relaxed),
            estimation_fallbacks: self.estimation_fallbacks.load(Ordering::Relaxed),
            dnf_skipped: self.dnf_skipped.load(Ordering::Relaxed),
            cursors_opened: self.cursors_opened.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            execution_errors: self.execution_errors.load(Ordering::Relaxed),
            queries_cancelled: self.queries_cancelled.load(Ordering::Relaxed),
        }
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub plans_selected: u64,
    pub plans_cost_based: u64,
    pub plans_heuristic: u64,
    pub planning_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub cache_collisions: u64,
    pub estimation_fallbacks: u64,
    pub dnf_skipped: u64,
    pub cursors_opened: u64,
    pub records_emitted: u64,
    pub execution_errors: u64,
    pub queries_cancelled: u64,
}
