//! Log sinks for the evaluator.

use std::cell::RefCell;
use std::fmt;

use crate::lang::issue::{Reported, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Notice,
    Warning,
    Err,
}

impl LogLevel {
    /// The level an issue of the given severity surfaces at, if any.
    pub fn for_severity(severity: Severity) -> Option<LogLevel> {
        match severity {
            Severity::Ignore => None,
            Severity::Notice => Some(LogLevel::Notice),
            Severity::Warning => Some(LogLevel::Warning),
            Severity::Error => Some(LogLevel::Err),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Err => "error",
        };
        f.write_str(s)
    }
}

/// A single log entry: a plain message, or a wrapped reported issue.
#[derive(Debug, Clone)]
pub enum LogEntry {
    Message(String),
    Issue(Reported),
}

impl LogEntry {
    pub fn message(&self) -> String {
        match self {
            LogEntry::Message(m) => m.clone(),
            LogEntry::Issue(r) => r.to_string(),
        }
    }
}

pub trait Logger {
    fn log(&self, level: LogLevel, entry: LogEntry);
}

/// Array-backed sink; the expectation engine reads it back per level.
#[derive(Debug, Default)]
pub struct ArrayLogger {
    entries: RefCell<Vec<(LogLevel, LogEntry)>>,
}

impl ArrayLogger {
    pub fn new() -> Self {
        ArrayLogger::default()
    }

    pub fn entries(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Logger for ArrayLogger {
    fn log(&self, level: LogLevel, entry: LogEntry) {
        self.entries.borrow_mut().push((level, entry));
    }
}

/// Writes straight to stderr. Used during the construction phase.
#[derive(Debug, Default)]
pub struct StdLogger;

impl Logger for StdLogger {
    fn log(&self, level: LogLevel, entry: LogEntry) {
        eprintln!("{}: {}", level, entry.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_filtered_by_level() {
        let log = ArrayLogger::new();
        log.log(LogLevel::Notice, LogEntry::Message("a".into()));
        log.log(LogLevel::Warning, LogEntry::Message("b".into()));
        log.log(LogLevel::Notice, LogEntry::Message("c".into()));
        let notices = log.entries(LogLevel::Notice);
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[1].message(), "c");
        assert_eq!(log.entries(LogLevel::Err).len(), 0);
    }
}
