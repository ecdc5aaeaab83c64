//! Issue definitions and reported diagnostics for the expression engine.
//!
//! Every diagnostic the engine can emit is declared up front as a static
//! [`IssueDef`] with a stable code and a `%{name}` template. A concrete
//! occurrence is a [`Reported`]: the definition plus a severity, the
//! template arguments, and an optional source location.

use std::fmt;

use crate::lang::value::Value;

/// Severity of a reported issue. `Ignore` drops the issue entirely when
/// mapping onto log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ignore,
    Notice,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Ignore => "ignore",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// A statically declared diagnostic: code plus message template.
#[derive(Debug)]
pub struct IssueDef {
    pub code: &'static str,
    pub template: &'static str,
}

macro_rules! issue_defs {
    ($table:ident; $($name:ident => $template:expr;)*) => {
        $(pub static $name: IssueDef = IssueDef {
            code: stringify!($name),
            template: $template,
        };)*

        /// All engine-level issue definitions, in declaration order.
        pub static $table: &[&IssueDef] = &[$(&$name),*];
    };
}

issue_defs! { LANG_ISSUES;
    PARSE_SYNTAX_ERROR => "syntax error: %{detail}";
    PARSE_ILLEGAL_BACKTICK => "backtick strings are not enabled for this parse";
    PARSE_ILLEGAL_TASK => "task definitions are not enabled for this parse";
    VALIDATE_ILLEGAL_ASSIGNMENT => "illegal assignment: left side must be a variable";
    VALIDATE_IDLE_EXPRESSION => "this expression is unproductive: its value is discarded";
    VALIDATE_NOT_TOP_LEVEL => "definition of '%{name}' must be at top level";
    EVAL_UNKNOWN_VARIABLE => "unknown variable '$%{name}'";
    EVAL_UNKNOWN_FUNCTION => "unknown function '%{name}'";
    EVAL_UNRESOLVED_REFERENCE => "reference '%{name}' cannot be resolved";
    EVAL_ILLEGAL_ARGUMENT_TYPE => "'%{function}' parameter %{index} expects a %{expected} value, got %{actual}";
    EVAL_ILLEGAL_ARGUMENT_COUNT => "'%{function}' expects %{expected} arguments, got %{actual}";
    EVAL_ILLEGAL_ASSIGNMENT => "illegal assignment target";
    EVAL_OPERATOR_NOT_APPLICABLE => "operator '%{operator}' is not applicable to a %{left} and a %{right}";
    EVAL_DIVISION_BY_ZERO => "division by zero";
    EVAL_RECURSION_LIMIT => "recursion limit exceeded";
    EVAL_FAILURE => "%{message}";
}

/// Looks up an engine issue definition by code.
pub fn lang_issue_for_code(code: &str) -> Option<&'static IssueDef> {
    LANG_ISSUES.iter().copied().find(|i| i.code == code)
}

/// A position within a source text. `file` may be empty for anonymous
/// sources; `line` and `col` are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Location { file: file.into(), line, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "line {}:{}", self.line, self.col)
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.col)
        }
    }
}

/// A concrete occurrence of an issue.
#[derive(Debug, Clone)]
pub struct Reported {
    issue: &'static IssueDef,
    severity: Severity,
    args: Vec<(String, Value)>,
    location: Option<Location>,
}

impl Reported {
    pub fn new(
        issue: &'static IssueDef,
        severity: Severity,
        args: Vec<(String, Value)>,
        location: Option<Location>,
    ) -> Self {
        Reported { issue, severity, args, location }
    }

    /// Shorthand for an error-severity report.
    pub fn error(
        issue: &'static IssueDef,
        args: Vec<(String, Value)>,
        location: Option<Location>,
    ) -> Self {
        Reported::new(issue, Severity::Error, args, location)
    }

    pub fn code(&self) -> &'static str {
        self.issue.code
    }

    pub fn issue(&self) -> &'static IssueDef {
        self.issue
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.args.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// The rendered message without the location suffix.
    pub fn message(&self) -> String {
        render_template(self.issue.template, &self.args)
    }
}

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())?;
        if let Some(loc) = &self.location {
            write!(f, " (at {})", loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for Reported {}

fn render_template(template: &str, args: &[(String, Value)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match args.iter().find(|(k, _)| k == name) {
                    Some((_, v)) => out.push_str(&v.to_string()),
                    None => {
                        out.push_str("%{");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("%{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Builds the argument vector for a [`Reported`].
///
/// `issue_args! { "name" => v, "other" => w }`
#[macro_export]
macro_rules! issue_args {
    ($($key:expr => $value:expr),* $(,)?) => {
        vec![$(($key.to_string(), $crate::lang::value::Value::from($value))),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_template_arguments() {
        let r = Reported::error(
            &EVAL_UNKNOWN_VARIABLE,
            issue_args! { "name" => "x" },
            Some(Location::new("spec.pspec", 3, 7)),
        );
        assert_eq!(r.to_string(), "unknown variable '$x' (at spec.pspec:3:7)");
        assert_eq!(r.code(), "EVAL_UNKNOWN_VARIABLE");
    }

    #[test]
    fn unknown_placeholder_is_kept_verbatim() {
        let r = Reported::error(&EVAL_FAILURE, vec![], None);
        assert_eq!(r.to_string(), "%{message}");
    }

    #[test]
    fn code_lookup() {
        assert!(lang_issue_for_code("EVAL_DIVISION_BY_ZERO").is_some());
        assert!(lang_issue_for_code("NO_SUCH_ISSUE").is_none());
    }
}
