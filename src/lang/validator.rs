//! Semantic validation of parsed trees.
//!
//! Validation never mutates the AST; it walks the tree and reports issues.
//! `Strictness` scales the severity of the strict diagnostics: the harness
//! validates example sources at `Error`.

use crate::issue_args;
use crate::lang::ast::{EppPart, Expr, StringExpr};
use crate::lang::issue::{
    Location, Reported, Severity, VALIDATE_IDLE_EXPRESSION, VALIDATE_ILLEGAL_ASSIGNMENT,
    VALIDATE_NOT_TOP_LEVEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Off,
    Warning,
    Error,
}

impl Strictness {
    fn severity(&self) -> Option<Severity> {
        match self {
            Strictness::Off => None,
            Strictness::Warning => Some(Severity::Warning),
            Strictness::Error => Some(Severity::Error),
        }
    }
}

pub fn validate(expr: &Expr, strictness: Strictness) -> Vec<Reported> {
    let mut checker = Checker { strictness, issues: Vec::new() };
    match expr {
        Expr::Program(stmts, _) => checker.check_body(stmts, true),
        Expr::Epp(parts, _) => checker.check_epp(parts),
        other => checker.check(other, true),
    }
    checker.issues
}

struct Checker {
    strictness: Strictness,
    issues: Vec<Reported>,
}

impl Checker {
    fn check_body(&mut self, stmts: &[Expr], top_level: bool) {
        let last = stmts.len().saturating_sub(1);
        for (i, stmt) in stmts.iter().enumerate() {
            // A literal whose value is discarded does nothing.
            if i != last && is_idle(stmt) {
                self.strict_issue(&VALIDATE_IDLE_EXPRESSION, stmt);
            }
            self.check(stmt, top_level);
        }
    }

    fn check(&mut self, expr: &Expr, top_level: bool) {
        match expr {
            Expr::Program(stmts, _) | Expr::Block(stmts, _) => self.check_body(stmts, false),

            Expr::Assignment(lhs, rhs, _) => {
                if !matches!(lhs.as_ref(), Expr::Variable(_, _)) {
                    self.error(&VALIDATE_ILLEGAL_ASSIGNMENT, expr);
                }
                self.check(lhs, false);
                self.check(rhs, false);
            }

            Expr::FunctionDef(def, _) => {
                if !top_level {
                    self.issues.push(Reported::error(
                        &VALIDATE_NOT_TOP_LEVEL,
                        issue_args! { "name" => def.name.as_str() },
                        Some(location_of(expr)),
                    ));
                }
                self.check_body(&def.body, false);
            }

            Expr::TaskDef(def, _) => {
                if !top_level {
                    self.issues.push(Reported::error(
                        &VALIDATE_NOT_TOP_LEVEL,
                        issue_args! { "name" => def.name.as_str() },
                        Some(location_of(expr)),
                    ));
                }
                for (k, v) in &def.entries {
                    self.check(k, false);
                    self.check(v, false);
                }
            }

            Expr::Unary(_, operand, _) => self.check(operand, false),
            Expr::Binary(_, lhs, rhs, _) => {
                self.check(lhs, false);
                self.check(rhs, false);
            }
            Expr::Array(items, _) => {
                for item in items {
                    self.check(item, false);
                }
            }
            Expr::HashLiteral(entries, _) => {
                for (k, v) in entries {
                    self.check(k, false);
                    self.check(v, false);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    self.check(arg, false);
                }
            }
            Expr::Epp(parts, _) => self.check_epp(parts),

            Expr::Undef(_)
            | Expr::Boolean(_, _)
            | Expr::Integer(_, _)
            | Expr::Float(_, _)
            | Expr::Str(_, _)
            | Expr::Regexp(_, _)
            | Expr::Variable(_, _)
            | Expr::QualifiedRef(_, _) => {}
        }
    }

    fn check_epp(&mut self, parts: &[EppPart]) {
        for part in parts {
            match part {
                EppPart::Text(_) => {}
                EppPart::Render(expr) => self.check(expr, false),
                EppPart::Exec(stmts) => {
                    for stmt in stmts {
                        self.check(stmt, false);
                    }
                }
            }
        }
    }

    fn error(&mut self, issue: &'static crate::lang::issue::IssueDef, expr: &Expr) {
        self.issues
            .push(Reported::error(issue, vec![], Some(location_of(expr))));
    }

    fn strict_issue(&mut self, issue: &'static crate::lang::issue::IssueDef, expr: &Expr) {
        if let Some(severity) = self.strictness.severity() {
            self.issues
                .push(Reported::new(issue, severity, vec![], Some(location_of(expr))));
        }
    }
}

fn location_of(expr: &Expr) -> Location {
    let span = expr.span();
    Location::new("", span.line, span.col)
}

/// A statement is idle when it is a pure literal whose value cannot matter.
fn is_idle(expr: &Expr) -> bool {
    match expr {
        Expr::Undef(_)
        | Expr::Boolean(_, _)
        | Expr::Integer(_, _)
        | Expr::Float(_, _)
        | Expr::Str(StringExpr::Literal(_), _)
        | Expr::Regexp(_, _) => true,
        Expr::Array(items, _) => items.iter().all(is_idle),
        Expr::HashLiteral(entries, _) => entries.iter().all(|(k, v)| is_idle(k) && is_idle(v)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::{parse, ParserOptions};

    fn validate_source(source: &str, strictness: Strictness) -> Vec<Reported> {
        let ast = parse("test", source, false, ParserOptions::default()).unwrap();
        validate(&ast, strictness)
    }

    #[test]
    fn idle_expressions_scale_with_strictness() {
        let issues = validate_source("1 notice('x')", Strictness::Error);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "VALIDATE_IDLE_EXPRESSION");
        assert_eq!(issues[0].severity(), Severity::Error);

        let issues = validate_source("1 notice('x')", Strictness::Warning);
        assert_eq!(issues[0].severity(), Severity::Warning);

        assert!(validate_source("1 notice('x')", Strictness::Off).is_empty());
    }

    #[test]
    fn final_statement_is_never_idle() {
        assert!(validate_source("notice('x') 1", Strictness::Error).is_empty());
        assert!(validate_source("42", Strictness::Error).is_empty());
    }

    #[test]
    fn illegal_assignment_target() {
        let issues = validate_source("1 = 2", Strictness::Error);
        assert_eq!(issues[0].code(), "VALIDATE_ILLEGAL_ASSIGNMENT");
    }

    #[test]
    fn nested_definitions_are_rejected() {
        let issues = validate_source(
            "function outer() { function inner() { 1 } }",
            Strictness::Error,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "VALIDATE_NOT_TOP_LEVEL");
    }
}
