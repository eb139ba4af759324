//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, then `severity`, then fields sorted by key
//! - Synchronous, no buffering
//! - Lines below the threshold are dropped

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use super::events::Event;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Parse a severity name, case-insensitive
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "TRACE" => Some(Severity::Trace),
            "INFO" => Some(Severity::Info),
            "WARN" => Some(Severity::Warn),
            "ERROR" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone)]
enum Sink {
    /// INFO and below to stdout, WARN and above to stderr
    Console,
    Memory(Arc<Mutex<Vec<String>>>),
    Discard,
}

/// Lines captured by a memory logger
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<String>>>);

impl LogBuffer {
    /// Captured lines, without trailing newlines
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Captured lines parsed as JSON
    pub fn entries(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    /// Captured lines whose `event` equals `name`
    pub fn events_named(&self, name: &str) -> Vec<serde_json::Value> {
        self.entries()
            .into_iter()
            .filter(|e| e["event"] == name)
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// A structured logger that outputs JSON lines.
///
/// Cheap to clone; clones share the sink.
#[derive(Clone)]
pub struct Logger {
    threshold: Severity,
    sink: Sink,
}

impl Default for Logger {
    fn default() -> Self {
        Self::console()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink = match self.sink {
            Sink::Console => "console",
            Sink::Memory(_) => "memory",
            Sink::Discard => "discard",
        };
        f.debug_struct("Logger")
            .field("threshold", &self.threshold)
            .field("sink", &sink)
            .finish()
    }
}

impl Logger {
    /// Log to stdout/stderr at INFO and above
    pub fn console() -> Self {
        Self {
            threshold: Severity::Info,
            sink: Sink::Console,
        }
    }

    /// Drop every line
    pub fn discard() -> Self {
        Self {
            threshold: Severity::Error,
            sink: Sink::Discard,
        }
    }

    /// Capture every line in memory, including TRACE
    pub fn memory() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let logger = Self {
            threshold: Severity::Trace,
            sink: Sink::Memory(Arc::clone(&buffer.0)),
        };
        (logger, buffer)
    }

    /// Drop lines below `threshold`
    pub fn with_threshold(mut self, threshold: Severity) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    pub fn enabled(&self, severity: Severity) -> bool {
        !matches!(self.sink, Sink::Discard) && severity >= self.threshold
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !self.enabled(severity) {
            return;
        }
        let line = Self::render(severity, event, fields);
        match &self.sink {
            Sink::Console if severity >= Severity::Warn => Self::write_line(&line, &mut io::stderr()),
            Sink::Console => Self::write_line(&line, &mut io::stdout()),
            Sink::Memory(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line),
            Sink::Discard => {}
        }
    }

    /// Log a typed event at its default severity
    pub fn event(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(event.severity(), event.as_str(), fields);
    }

    fn write_line<W: Write>(line: &str, writer: &mut W) {
        // one write per line keeps concurrent lines from interleaving
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        let _ = writer.write_all(&bytes);
        let _ = writer.flush();
    }

    /// Render one JSON line, without the trailing newline
    pub fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(256);

        output.push('{');
        output.push_str("\"event\":\"");
        Self::escape_json_string(&mut output, event);
        output.push('"');

        output.push_str(",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push('"');

        let mut sorted_fields: Vec<_> = fields.iter().collect();
        sorted_fields.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted_fields {
            output.push_str(",\"");
            Self::escape_json_string(&mut output, key);
            output.push_str("\":\"");
            Self::escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push('}');
        output
    }

    fn escape_json_string(output: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => output.push_str("\\\""),
                '\\' => output.push_str("\\\\"),
                '\n' => output.push_str("\\n"),
                '\r' => output.push_str("\\r"),
                '\t' => output.push_str("\\t"),
                c if c.is_control() => {
                    output.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => output.push(c),
            }
        }
    }

    /// Log at TRACE level
    pub fn trace(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert_eq!(Severity::parse("warn"), Some(Severity::Warn));
        assert_eq!(Severity::parse("loud"), None);
    }

    #[test]
    fn test_log_json_format() {
        let line = Logger::render(Severity::Info, "CURSOR_EXHAUSTED", &[("records", "42")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "CURSOR_EXHAUSTED");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["records"], "42");
    }

    #[test]
    fn test_fields_sorted_by_key() {
        let fields = [("plan_type", "Union"), ("candidates", "3"), ("mode", "heuristic")];
        let mut shuffled = fields;
        shuffled.reverse();
        let line = Logger::render(Severity::Info, "PLAN_SELECTED", &fields);
        assert_eq!(line, Logger::render(Severity::Info, "PLAN_SELECTED", &shuffled));

        let at = |needle: &str| line.find(needle).unwrap();
        assert!(at("\"event\"") < at("\"severity\""));
        assert!(at("candidates") < at("mode"));
        assert!(at("mode") < at("plan_type"));
    }

    #[test]
    fn test_log_escapes_special_chars() {
        let line = Logger::render(Severity::Warn, "CURSOR_ABORTED", &[("filter", "name = \"a\"\nb")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["filter"], "name = \"a\"\nb");
    }

    #[test]
    fn test_memory_sink_and_threshold() {
        let (logger, buffer) = Logger::memory();
        let logger = logger.with_threshold(Severity::Info);
        logger.trace("HIDDEN", &[]);
        logger.info("SHOWN", &[("k", "v")]);
        logger.event(Event::PlanCacheCollision, &[]);

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| !l.contains('\n')));
        assert_eq!(buffer.events_named("SHOWN").len(), 1);
        assert_eq!(buffer.events_named("PLAN_CACHE_COLLISION")[0]["severity"], "WARN");
    }

    #[test]
    fn test_discard_sink() {
        let logger = Logger::discard();
        assert!(!logger.enabled(Severity::Error));
        logger.error("NOWHERE", &[]);
    }
}
