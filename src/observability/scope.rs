//! Timed observation scopes
//!
//! - Logs `{name}_BEGIN` at TRACE on creation
//! - Logs `{name}_COMPLETE` with `elapsed_us` on completion
//! - Logs `{name}_FAILED` on failure
//! - Logs `{name}_INCOMPLETE` if dropped without either

use std::time::{Duration, Instant};

use super::logger::{Logger, Severity};

/// A scope that logs its own start, end and duration.
pub struct ObservationScope<'a> {
    logger: &'a Logger,
    name: &'a str,
    timer: Timer,
    completed: bool,
    fields: Vec<(&'a str, String)>,
}

impl<'a> ObservationScope<'a> {
    /// Create a new observation scope
    pub fn new(logger: &'a Logger, name: &'a str) -> Self {
        Self::with_fields(logger, name, &[])
    }

    /// Create a scope whose fields are repeated on every line
    pub fn with_fields(logger: &'a Logger, name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        logger.trace(&format!("{}_BEGIN", name), fields);
        Self {
            logger,
            name,
            timer: Timer::new(),
            completed: false,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        }
    }

    /// Time since the scope began
    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    fn finish(mut self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        self.completed = true;
        let elapsed = self.timer.elapsed_us();
        let mut fields: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend(extra.iter().copied());
        fields.push(("elapsed_us", &elapsed));
        self.logger.log(severity, &format!("{}_{}", self.name, suffix), &fields);
    }

    /// Mark the scope completed
    pub fn complete(self) {
        self.finish(Severity::Trace, "COMPLETE", &[]);
    }

    /// Mark the scope completed, adding fields to the final line
    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.finish(Severity::Trace, "COMPLETE", extra_fields);
    }

    /// Mark the scope failed
    pub fn fail(self, reason: &str) {
        self.fail_with_fields(&[("reason", reason)]);
    }

    /// Mark the scope failed, adding fields to the final line
    pub fn fail_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.finish(Severity::Warn, "FAILED", extra_fields);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.logger.warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// A simple duration timer
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed microseconds as a string
    pub fn elapsed_us(&self) -> String {
        self.start.elapsed().as_micros().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_logs_begin_and_complete() {
        let (logger, buffer) = Logger::memory();
        let scope = ObservationScope::with_fields(&logger, "PLANNING", &[("record_type", "users")]);
        assert!(!scope.is_completed());
        scope.complete_with_fields(&[("plan", "FullScan")]);

        let begin = buffer.events_named("PLANNING_BEGIN");
        let complete = buffer.events_named("PLANNING_COMPLETE");
        assert_eq!(begin.len(), 1);
        assert_eq!(complete[0]["record_type"], "users");
        assert_eq!(complete[0]["plan"], "FullScan");
        assert!(complete[0]["elapsed_us"].is_string());
        assert!(buffer.events_named("PLANNING_INCOMPLETE").is_empty());
    }

    #[test]
    fn test_scope_fail() {
        let (logger, buffer) = Logger::memory();
        ObservationScope::new(&logger, "PLANNING").fail("no index");
        let failed = buffer.events_named("PLANNING_FAILED");
        assert_eq!(failed[0]["reason"], "no index");
        assert_eq!(failed[0]["severity"], "WARN");
    }

    #[test]
    fn test_scope_fail_with_fields() {
        let (logger, buffer) = Logger::memory();
        let scope = ObservationScope::with_fields(&logger, "PLANNING", &[("record_type", "users")]);
        scope.fail_with_fields(&[("code", "REC_PLAN_INVALID_QUERY"), ("reason", "limit must be at least 1")]);

        let failed = buffer.events_named("PLANNING_FAILED");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["record_type"], "users");
        assert_eq!(failed[0]["code"], "REC_PLAN_INVALID_QUERY");
        assert!(failed[0].get("elapsed_us").is_some());
        assert!(buffer.events_named("PLANNING_INCOMPLETE").is_empty());
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let (logger, buffer) = Logger::memory();
        drop(ObservationScope::new(&logger, "PLANNING"));
        assert_eq!(buffer.events_named("PLANNING_INCOMPLETE").len(), 1);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.elapsed() >= Duration::from_millis(2));
        let us: u128 = timer.elapsed_us().parse().unwrap();
        assert!(us >= 2000);
    }
}
