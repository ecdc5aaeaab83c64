//! The expectation-matching engine.
//!
//! An [`Expectation`] carries per-level include and exclude sets. Checking
//! diffs the produced log entries and reported issues against those sets
//! into a message buffer; a non-empty buffer fails the test with the whole
//! buffer as the message.

use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::context::{Assertions, Failed};
use crate::lang::format;
use crate::lang::issue::{IssueDef, Reported};
use crate::lang::logger::{ArrayLogger, LogEntry, LogLevel};
use crate::lang::value::{RegexValue, Value};

/// The value side of an `Issue(code, {args})` matcher entry.
#[derive(Debug)]
pub enum IssueArgMatch {
    Matcher(Rc<Matcher>),
    Value(Value),
}

#[derive(Debug)]
pub enum Matcher {
    /// Exact or (for `Contain`) substring text match.
    Str { partial: bool, text: String },
    Regex(RegexValue),
    Issue {
        issue: &'static IssueDef,
        args: Option<Vec<(String, IssueArgMatch)>>,
    },
}

impl Matcher {
    pub fn contain(text: &str) -> Matcher {
        Matcher::Str { partial: true, text: text.to_string() }
    }

    pub fn exact(text: &str) -> Matcher {
        Matcher::Str { partial: false, text: text.to_string() }
    }

    pub fn match_string(&self, s: &str) -> bool {
        match self {
            Matcher::Str { partial: true, text } => s.contains(text.as_str()),
            Matcher::Str { partial: false, text } => s == text,
            Matcher::Regex(re) => re.is_match(s),
            Matcher::Issue { issue, .. } => issue.code == s,
        }
    }

    pub fn match_issue(&self, reported: &Reported) -> bool {
        match self {
            Matcher::Str { partial: true, text } => reported.to_string().contains(text.as_str()),
            Matcher::Str { partial: false, text } => reported.to_string() == *text,
            Matcher::Regex(re) => re.is_match(&reported.to_string()),
            Matcher::Issue { issue, args } => {
                if issue.code != reported.code() {
                    return false;
                }
                let args = match args {
                    None => return true,
                    Some(args) => args,
                };
                args.iter().all(|(name, expected)| {
                    let actual = match reported.argument(name) {
                        Some(v) => v,
                        None => return false,
                    };
                    match expected {
                        IssueArgMatch::Matcher(m) => m.match_string(&actual.to_string()),
                        IssueArgMatch::Value(v) => v.equals(actual),
                    }
                })
            }
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Str { text, .. } => f.write_str(&format::quote(text)),
            Matcher::Regex(re) => write!(f, "/{}/", re.pattern()),
            Matcher::Issue { issue, .. } => f.write_str(issue.code),
        }
    }
}

#[derive(Debug)]
pub struct Include {
    pub matchers: Vec<Rc<Matcher>>,
}

#[derive(Debug)]
pub struct Exclude {
    pub matchers: Vec<Rc<Matcher>>,
}

#[derive(Debug)]
pub struct LevelExpectation {
    pub level: LogLevel,
    pub includes: Vec<Rc<Include>>,
    pub excludes: Vec<Rc<Exclude>>,
}

impl LevelExpectation {
    /// A single include-matcher expectation, the common constructor output.
    pub fn including(level: LogLevel, matcher: Rc<Matcher>) -> LevelExpectation {
        LevelExpectation {
            level,
            includes: vec![Rc::new(Include { matchers: vec![matcher] })],
            excludes: vec![],
        }
    }
}

#[derive(Debug, Default)]
pub struct Expectation {
    pub levels: Vec<LevelExpectation>,
}

impl Expectation {
    /// The empty expectation: nothing included, nothing excluded, so any
    /// produced entry or issue is unexpected.
    pub fn expect_ok() -> Rc<Expectation> {
        Rc::new(Expectation::default())
    }

    /// Diffs produced entries and issues against this expectation,
    /// appending findings to `buf`.
    pub fn match_entries(&self, buf: &mut String, log: &ArrayLogger, issues: &[Reported]) {
        for level in [LogLevel::Notice, LogLevel::Warning, LogLevel::Err] {
            let mut level_issues: Vec<Reported> = issues
                .iter()
                .filter(|i| LogLevel::for_severity(i.severity()) == Some(level))
                .cloned()
                .collect();
            let mut texts = Vec::new();
            for entry in log.entries(level) {
                match entry {
                    LogEntry::Message(m) => texts.push(m),
                    LogEntry::Issue(r) => level_issues.push(r),
                }
            }

            let mut includes: Vec<Rc<Include>> = Vec::new();
            let mut excludes: Vec<Rc<Exclude>> = Vec::new();
            for le in &self.levels {
                if le.level == level {
                    includes.extend(le.includes.iter().cloned());
                    excludes.extend(le.excludes.iter().cloned());
                }
            }

            match_level(buf, level, &includes, &excludes, &texts, &level_issues);
        }
    }
}

fn match_level(
    buf: &mut String,
    level: LogLevel,
    includes: &[Rc<Include>],
    excludes: &[Rc<Exclude>],
    entries: &[String],
    issues: &[Reported],
) {
    'next_entry: for entry in entries {
        for include in includes {
            if include.matchers.iter().any(|m| m.match_string(entry)) {
                continue 'next_entry;
            }
        }
        let mut excluded = false;
        for exclude in excludes {
            for m in &exclude.matchers {
                if m.match_string(entry) {
                    let _ = writeln!(buf, "{}({}) matches exclusion {}", level, entry, m);
                    excluded = true;
                }
            }
        }
        if !excluded {
            let _ = writeln!(buf, "Unexpected {}('{}')", level, entry);
        }
    }

    'next_issue: for issue in issues {
        for include in includes {
            if include.matchers.iter().any(|m| m.match_issue(issue)) {
                continue 'next_issue;
            }
        }
        let mut excluded = false;
        for exclude in excludes {
            for m in &exclude.matchers {
                if m.match_issue(issue) {
                    let _ = writeln!(buf, "{} matches exclusion {}", issue, m);
                    excluded = true;
                }
            }
        }
        if !excluded {
            let _ = writeln!(buf, "Unexpected {}: {}", issue.code(), issue);
        }
    }

    for include in includes {
        'next_matcher: for m in &include.matchers {
            for entry in entries {
                if m.match_string(entry) {
                    continue 'next_matcher;
                }
            }
            for issue in issues {
                if m.match_issue(issue) {
                    continue 'next_matcher;
                }
            }
            let _ = writeln!(buf, "Expected {}({}) but it was not produced", level, m);
        }
    }
}

/// Runs every expectation over the produced issues and log; a non-empty
/// diff fails the assertion.
pub fn validate_expectations(
    assertions: &mut dyn Assertions,
    expectations: &[Rc<Expectation>],
    issues: &[Reported],
    log: &ArrayLogger,
) -> Result<(), Failed> {
    let mut buf = String::new();
    for expectation in expectations {
        expectation.match_entries(&mut buf, log, issues);
    }
    if buf.is_empty() {
        Ok(())
    } else {
        assertions.fail(&buf)
    }
}
