//! The test driver.
//!
//! Discovers `.pspec` files, runs the construction phase per file, and
//! walks the resulting test tree as nested sub-tests against a
//! [`SpecReporter`]. Each executable body runs with freshly reset settings
//! under a process-wide lock, and its tear-downs are drained LIFO behind a
//! panic guard.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;

use miette::{NamedSource, SourceSpan};
use once_cell::sync::Lazy;
use thiserror::Error;
use walkdir::WalkDir;

use crate::constructors::register_constructors;
use crate::context::{Assertions, Failed, RunError, Test, TestContext, TestExecutable};
use crate::lang::eval::base_registry;
use crate::lang::functions::FunctionRegistry;
use crate::lang::issue::Reported;
use crate::lang::logger::{LogEntry, LogLevel, Logger, StdLogger};
use crate::lang::parser::{parse, ParserOptions};
use crate::lang::settings;
use crate::lang::value::Value;
use crate::spec_eval::SpecEval;

/// Serialises executable bodies: the settings store is process-wide, so
/// concurrent harness invocations interleave only at whole-example
/// granularity.
static EXEC_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Error, miette::Diagnostic)]
pub enum PspecError {
    #[error(transparent)]
    #[diagnostic(code(pspec::io))]
    Io(#[from] std::io::Error),

    #[error("failed to walk spec root: {0}")]
    #[diagnostic(code(pspec::walk))]
    Walk(#[from] walkdir::Error),

    /// A spec file whose construction phase failed.
    #[error("{message}")]
    #[diagnostic(code(pspec::construction))]
    Construction {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("{label}")]
        span: SourceSpan,
        label: String,
    },
}

/// The host-runner surface: nested named sub-tests with a pass/fail per
/// executable.
pub trait SpecReporter {
    fn enter(&mut self, name: &str);
    fn leave(&mut self);
    fn pass(&mut self);
    fn fail(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";

/// Prints PASS/FAIL lines with slash-joined sub-test paths and keeps
/// summary counts.
pub struct ConsoleReporter {
    use_colors: bool,
    path: Vec<String>,
    summary: Summary,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        ConsoleReporter::with_colors(atty::is(atty::Stream::Stdout))
    }

    pub fn with_colors(use_colors: bool) -> Self {
        ConsoleReporter { use_colors, path: Vec::new(), summary: Summary::default() }
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn print_summary(&self) {
        println!(
            "\nSpec summary: {} {}, {} {}",
            self.colorize("passed", GREEN),
            self.summary.passed,
            self.colorize("failed", RED),
            self.summary.failed,
        );
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }

    fn current_path(&self) -> String {
        self.path.join("/")
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        ConsoleReporter::new()
    }
}

impl SpecReporter for ConsoleReporter {
    fn enter(&mut self, name: &str) {
        self.path.push(name.to_string());
    }

    fn leave(&mut self) {
        self.path.pop();
    }

    fn pass(&mut self) {
        self.summary.passed += 1;
        println!("{}: {}", self.colorize("PASS", GREEN), self.current_path());
    }

    fn fail(&mut self, message: &str) {
        self.summary.failed += 1;
        println!("{}: {}", self.colorize("FAIL", RED), self.current_path());
        for line in message.lines() {
            eprintln!("  {}", line);
        }
    }
}

/// Collects outcomes instead of printing; the reporter embedders and the
/// crate's own tests drive assertions against.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    path: Vec<String>,
    /// (slash-joined sub-test path, failure message if any)
    pub outcomes: Vec<(String, Option<String>)>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        RecordingReporter::default()
    }

    pub fn passed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, f)| f.is_none())
            .map(|(p, _)| p.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(p, f)| f.as_deref().map(|m| (p.as_str(), m)))
            .collect()
    }
}

impl SpecReporter for RecordingReporter {
    fn enter(&mut self, name: &str) {
        self.path.push(name.to_string());
    }

    fn leave(&mut self) {
        self.path.pop();
    }

    fn pass(&mut self) {
        self.outcomes.push((self.path.join("/"), None));
    }

    fn fail(&mut self, message: &str) {
        self.outcomes.push((self.path.join("/"), Some(message.to_string())));
    }
}

/// Counts pass/fail while delegating to the wrapped reporter.
struct CountingReporter<'a> {
    inner: &'a mut dyn SpecReporter,
    summary: Summary,
}

impl SpecReporter for CountingReporter<'_> {
    fn enter(&mut self, name: &str) {
        self.inner.enter(name);
    }

    fn leave(&mut self) {
        self.inner.leave();
    }

    fn pass(&mut self) {
        self.summary.passed += 1;
        self.inner.pass();
    }

    fn fail(&mut self, message: &str) {
        self.summary.failed += 1;
        self.inner.fail(message);
    }
}

/// Records assertion outcomes for one executable; the first failure stops
/// the body via the `Failed` marker.
#[derive(Debug, Default)]
pub struct RecordingAssertions {
    messages: Vec<String>,
}

impl Assertions for RecordingAssertions {
    fn assert_equals(&mut self, expected: &Value, actual: &Value) -> Result<(), Failed> {
        if expected.equals(actual) {
            Ok(())
        } else {
            self.messages.push(format!(
                "expected {} '{}', got {} '{}'",
                expected.type_name(),
                expected,
                actual.type_name(),
                actual
            ));
            Err(Failed)
        }
    }

    fn fail(&mut self, message: &str) -> Result<(), Failed> {
        self.messages.push(message.to_string());
        Err(Failed)
    }
}

/// Recursively collects every `.pspec` file under `root`, sorted for
/// deterministic execution order.
pub fn discover_spec_files(root: &Path) -> Result<Vec<PathBuf>, PspecError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "pspec")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// The harness entry point: runs every spec file under `test_root`,
/// reporting nested sub-tests to `reporter`. `init` may register extra
/// engine functions visible to both the construction phase and example
/// sources.
pub fn run_spec_tests(
    reporter: &mut dyn SpecReporter,
    test_root: &Path,
    init: Option<&dyn Fn(&mut FunctionRegistry)>,
) -> Result<Summary, PspecError> {
    let mut counting = CountingReporter { inner: reporter, summary: Summary::default() };
    for file in discover_spec_files(test_root)? {
        run_spec_file(&mut counting, &file, init);
    }
    Ok(counting.summary)
}

fn run_spec_file(
    reporter: &mut dyn SpecReporter,
    file: &Path,
    init: Option<&dyn Fn(&mut FunctionRegistry)>,
) {
    let file_name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let source = match fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            reporter.enter(&file_name);
            reporter.fail(&format!("failed to read {}: {}", file.display(), e));
            reporter.leave();
            return;
        }
    };

    let mut exec_registry = base_registry();
    if let Some(init) = init {
        init(&mut exec_registry);
    }
    let mut spec_registry = exec_registry.clone();
    register_constructors(&mut spec_registry);

    // Spec files themselves are parsed with backtick strings and hex
    // escapes enabled, so sources can be quoted without escape noise.
    let options = ParserOptions {
        backtick_strings: true,
        hex_escapes: true,
        ..Default::default()
    };
    let path_str = file.display().to_string();

    let tests = parse(&path_str, &source, false, options)
        .and_then(|ast| SpecEval::new().create_tests(&ast, &spec_registry));

    match tests {
        Ok(tests) => {
            let registry = Rc::new(exec_registry);
            run_tests(reporter, &tests, None, &registry);
        }
        Err(issue) => {
            // A construction error aborts discovery for this file and
            // fails it as a single sub-test; other files still run.
            reporter.enter(&file_name);
            reporter.fail(&render_construction_error(&path_str, &source, issue));
            reporter.leave();
        }
    }
}

fn run_tests(
    reporter: &mut dyn SpecReporter,
    tests: &[Test],
    parent: Option<&TestContext>,
    registry: &Rc<FunctionRegistry>,
) {
    for test in tests {
        match test {
            Test::Executable(executable) => {
                let ctx = match parent {
                    Some(p) => p.child(executable.node.clone()),
                    None => TestContext::new_root(executable.node.clone(), registry.clone()),
                };
                reporter.enter(executable.node.description());
                match run_executable(executable, &ctx) {
                    None => reporter.pass(),
                    Some(message) => reporter.fail(&message),
                }
                reporter.leave();
            }
            Test::Group(group) => {
                let ctx = match parent {
                    Some(p) => p.child(group.node.clone()),
                    None => TestContext::new_root(group.node.clone(), registry.clone()),
                };
                reporter.enter(group.node.description());
                run_tests(reporter, &group.tests, Some(&ctx), registry);
                reporter.leave();
            }
        }
    }
}

fn run_executable(executable: &TestExecutable, ctx: &TestContext) -> Option<String> {
    let _guard = EXEC_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    settings::reset();

    let mut asserts = RecordingAssertions::default();
    let result = (executable.body)(ctx, &mut asserts);
    if let Err(RunError::Issue(issue)) = result {
        asserts.messages.push(issue.to_string());
    }

    // Tear-downs run LIFO; a panicking tear-down is logged, never
    // propagated.
    for tear_down in ctx.drain_tear_downs() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(tear_down)) {
            StdLogger.log(
                LogLevel::Err,
                LogEntry::Message(format!("tear-down panicked: {}", panic_message(&panic))),
            );
        }
    }

    if asserts.messages.is_empty() {
        None
    } else {
        Some(asserts.messages.join("\n"))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn render_construction_error(path: &str, source: &str, issue: Reported) -> String {
    let span: SourceSpan = match issue.location() {
        Some(loc) => {
            let offset = offset_of(source, loc.line, loc.col);
            (offset..offset).into()
        }
        None => (0..0).into(),
    };
    let error = PspecError::Construction {
        message: issue.message(),
        src: NamedSource::new(path, source.to_string()),
        span,
        label: issue.code().to_string(),
    };
    format!("{:?}", miette::Report::new(error))
}

/// Byte offset of a 1-based line/column position in `source`.
fn offset_of(source: &str, line: u32, col: u32) -> usize {
    let mut remaining = line.saturating_sub(1);
    let mut offset = 0usize;
    for (i, c) in source.char_indices() {
        if remaining == 0 {
            break;
        }
        if c == '\n' {
            remaining -= 1;
            offset = i + 1;
        }
    }
    (offset + col.saturating_sub(1) as usize).min(source.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_computed_from_line_and_column() {
        let src = "ab\ncd\nef";
        assert_eq!(offset_of(src, 1, 1), 0);
        assert_eq!(offset_of(src, 2, 2), 4);
        assert_eq!(offset_of(src, 3, 1), 6);
        assert_eq!(offset_of(src, 9, 9), src.len());
    }

    #[test]
    fn recording_assertions_track_the_first_failure() {
        let mut asserts = RecordingAssertions::default();
        assert!(asserts.assert_equals(&Value::from(1i64), &Value::from(1i64)).is_ok());
        assert!(asserts.assert_equals(&Value::from(1i64), &Value::from(2i64)).is_err());
        assert!(asserts.messages[0].contains("expected Integer '1', got Integer '2'"));
    }
}
