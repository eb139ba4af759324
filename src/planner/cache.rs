//! Plan cache
//!
//! Maps query fingerprints to selected plans. Reads take the shared lock
//! and bump an atomic use tick; inserts take the exclusive lock and evict
//! the least recently used entry when full. Concurrent inserts of the
//! same fingerprint resolve last writer wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::plan::Plan;
use crate::cost::QueryCost;
use crate::filter::Fingerprint;

/// Plan cache failures. Callers treat every one as a miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("fingerprint {fingerprint} is cached for a different query")]
    Collision {
        fingerprint: Fingerprint,
        cached: String,
        requested: String,
    },
}

/// A cached plan.
#[derive(Debug)]
pub struct CacheEntry {
    pub canonical: String,
    pub plan: Arc<Plan>,
    pub cost: QueryCost,
    pub created_at: DateTime<Utc>,
    last_used: AtomicU64,
}

impl CacheEntry {
    /// Tick of the most recent lookup or insert
    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }
}

/// Bounded LRU cache of selected plans.
#[derive(Debug)]
pub struct PlanCache {
    capacity: usize,
    entries: RwLock<HashMap<Fingerprint, Arc<CacheEntry>>>,
    tick: AtomicU64,
}

impl PlanCache {
    /// Cache holding at most `capacity` plans (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a plan.
    ///
    /// A fingerprint cached for different canonical text is a collision.
    pub fn get(&self, fingerprint: &Fingerprint, canonical: &str) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(fingerprint) else {
            return Ok(None);
        };
        if entry.canonical != canonical {
            return Err(CacheError::Collision {
                fingerprint: *fingerprint,
                cached: entry.canonical.clone(),
                requested: canonical.to_string(),
            });
        }
        entry.last_used.store(self.next_tick(), Ordering::Relaxed);
        Ok(Some(Arc::clone(entry)))
    }

    /// Store a plan, returning the fingerprint evicted to make room
    pub fn insert(
        &self,
        fingerprint: Fingerprint,
        canonical: String,
        plan: Arc<Plan>,
        cost: QueryCost,
    ) -> Option<Fingerprint> {
        let entry = Arc::new(CacheEntry {
            canonical,
            plan,
            cost,
            created_at: Utc::now(),
            last_used: AtomicU64::new(self.next_tick()),
        });

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = None;
        if !entries.contains_key(&fingerprint) && entries.len() >= self.capacity {
            evicted = entries
                .iter()
                .min_by_key(|(fp, e)| (e.last_used(), **fp))
                .map(|(fp, _)| *fp);
            if let Some(fp) = &evicted {
                entries.remove(fp);
            }
        }
        entries.insert(fingerprint, entry);
        evicted
    }

    /// Drop every cached plan
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
