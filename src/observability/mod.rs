//! Observability for the planner and executor
//!
//! - Structured logging (JSON lines)
//! - Typed events
//! - Counters for planning, caching and execution
//! - Timed scopes
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on planning or execution
//! 3. No async or background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```
//! use recordplan::observability::{Event, Logger, MetricsRegistry, ObservationScope};
//!
//! let (logger, buffer) = Logger::memory();
//! logger.event(Event::PlanSelected, &[("plan_type", "IndexScan")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_cache_hits();
//!
//! let scope = ObservationScope::new(&logger, "PLANNING");
//! scope.complete();
//! assert_eq!(buffer.events_named("PLAN_SELECTED").len(), 1);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{LogBuffer, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};
