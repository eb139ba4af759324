//! Observable planner and executor events
//!
//! Events are explicit and typed. Planning failures are not listed: the
//! planning scope reports them as `PLANNING_FAILED`.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Planning
    /// A plan was chosen for a query
    PlanSelected,
    /// DNF expansion skipped for exceeding the term bound
    DnfSkipped,
    /// IN list too long for an IN-join
    InListTooLong,
    /// Statistics failed validation; defaults used
    StatisticsRejected,

    // Plan cache
    /// Cached plan reused
    PlanCacheHit,
    /// No cached plan
    PlanCacheMiss,
    /// Least recently used plan evicted
    PlanCacheEvicted,
    /// Fingerprint matched a different query
    PlanCacheCollision,

    // Execution
    /// Cursor tree built for a plan
    CursorOpened,
    /// Cursor tree exhausted
    CursorExhausted,
    /// Cursor failed and will not resume
    CursorAborted,
    /// Execution cancelled by the caller
    QueryCancelled,

    // Configuration
    /// Planner configuration loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the event name as used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PlanSelected => "PLAN_SELECTED",
            Event::DnfSkipped => "DNF_SKIPPED",
            Event::InListTooLong => "IN_LIST_TOO_LONG",
            Event::StatisticsRejected => "STATISTICS_REJECTED",
            Event::PlanCacheHit => "PLAN_CACHE_HIT",
            Event::PlanCacheMiss => "PLAN_CACHE_MISS",
            Event::PlanCacheEvicted => "PLAN_CACHE_EVICTED",
            Event::PlanCacheCollision => "PLAN_CACHE_COLLISION",
            Event::CursorOpened => "CURSOR_OPENED",
            Event::CursorExhausted => "CURSOR_EXHAUSTED",
            Event::CursorAborted => "CURSOR_ABORTED",
            Event::QueryCancelled => "QUERY_CANCELLED",
            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Default severity for the event
    pub fn severity(&self) -> Severity {
        match self {
            Event::PlanCacheHit
            | Event::PlanCacheMiss
            | Event::CursorOpened
            | Event::CursorExhausted => Severity::Trace,
            Event::PlanSelected
            | Event::DnfSkipped
            | Event::InListTooLong
            | Event::PlanCacheEvicted
            | Event::ConfigLoaded => Severity::Info,
            Event::StatisticsRejected
            | Event::PlanCacheCollision
            | Event::QueryCancelled => Severity::Warn,
            Event::CursorAborted => Severity::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::PlanSelected.as_str(), "PLAN_SELECTED");
        assert_eq!(Event::PlanCacheCollision.to_string(), "PLAN_CACHE_COLLISION");
        assert_eq!(Event::StatisticsRejected.as_str(), "STATISTICS_REJECTED");
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(Event::CursorAborted.severity(), Severity::Error);
        assert_eq!(Event::PlanCacheHit.severity(), Severity::Trace);
        assert!(Event::StatisticsRejected.severity() > Event::PlanSelected.severity());
    }
}
