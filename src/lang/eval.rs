//! Tree-walking evaluator.
//!
//! The evaluator owns a function registry, a log sink, and the definitions
//! collected by [`Evaluator::add_definitions`]. Every recursive step goes
//! through [`Evaluator::eval`], which first offers the expression to an
//! optional [`EvalOverride`], the seam the construction-phase evaluator
//! hooks to intercept blocks, references, and reserved calls.

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::issue_args;
use crate::lang::ast::{
    BinaryOp, EppPart, Expr, FunctionDef, Span, StrPart, StringExpr, TaskDef, UnaryOp,
};
use crate::lang::format;
use crate::lang::functions::{rep, req, FunctionBuilder, FunctionRegistry, TypeSpec};
use crate::lang::issue::{
    Location, Reported, EVAL_DIVISION_BY_ZERO, EVAL_FAILURE, EVAL_ILLEGAL_ARGUMENT_COUNT,
    EVAL_ILLEGAL_ASSIGNMENT, EVAL_OPERATOR_NOT_APPLICABLE, EVAL_RECURSION_LIMIT,
    EVAL_UNKNOWN_VARIABLE, EVAL_UNRESOLVED_REFERENCE,
};
use crate::lang::logger::{LogEntry, LogLevel, Logger};
use crate::lang::scope::{BasicScope, Scope};
use crate::lang::settings;
use crate::lang::value::{RegexValue, Value};

const MAX_DEPTH: usize = 256;

/// Per-evaluation state threaded through the recursion.
pub struct Frame<'a> {
    pub scope: &'a mut dyn Scope,
    pub depth: usize,
    pub overrides: Option<&'a dyn EvalOverride>,
}

/// Interception hook. Return `None` to fall through to the base evaluator.
pub trait EvalOverride {
    fn eval(&self, ev: &Evaluator, expr: &Expr, frame: &mut Frame) -> Option<Result<Value, Reported>>;
}

#[derive(Default)]
struct Definitions {
    functions: HashMap<String, Rc<FunctionDef>>,
    tasks: HashMap<String, Rc<TaskDef>>,
}

pub struct Evaluator {
    registry: FunctionRegistry,
    logger: Rc<dyn Logger>,
    defs: Definitions,
}

impl Evaluator {
    pub fn new(registry: FunctionRegistry, logger: Rc<dyn Logger>) -> Self {
        Evaluator { registry, logger, defs: Definitions::default() }
    }

    pub fn logger(&self) -> &Rc<dyn Logger> {
        &self.logger
    }

    /// Collects `function` and `task` definitions from the top level of the
    /// given tree so later evaluation can call them.
    pub fn add_definitions(&mut self, expr: &Expr) {
        let stmts = match expr {
            Expr::Program(stmts, _) | Expr::Block(stmts, _) => stmts.as_slice(),
            other => std::slice::from_ref(other),
        };
        for stmt in stmts {
            match stmt {
                Expr::FunctionDef(def, _) => {
                    self.defs.functions.insert(def.name.clone(), def.clone());
                }
                Expr::TaskDef(def, _) => {
                    self.defs.tasks.insert(def.name.clone(), def.clone());
                }
                _ => {}
            }
        }
    }

    pub fn top_evaluate(&mut self, expr: &Expr, scope: &mut dyn Scope) -> Result<Value, Reported> {
        let mut frame = Frame { scope, depth: 0, overrides: None };
        self.eval(expr, &mut frame)
    }

    pub fn top_evaluate_with(
        &mut self,
        expr: &Expr,
        scope: &mut dyn Scope,
        overrides: &dyn EvalOverride,
    ) -> Result<Value, Reported> {
        let mut frame = Frame { scope, depth: 0, overrides: Some(overrides) };
        self.eval(expr, &mut frame)
    }

    /// The dispatch entry every recursion uses.
    pub fn eval(&self, expr: &Expr, frame: &mut Frame) -> Result<Value, Reported> {
        if frame.depth > MAX_DEPTH {
            return Err(Reported::error(
                &EVAL_RECURSION_LIMIT,
                vec![],
                Some(location_of(expr.span())),
            ));
        }
        if let Some(overrides) = frame.overrides {
            if let Some(result) = overrides.eval(self, expr, frame) {
                return result;
            }
        }
        self.base_eval(expr, frame)
    }

    pub fn base_eval(&self, expr: &Expr, frame: &mut Frame) -> Result<Value, Reported> {
        match expr {
            Expr::Program(stmts, _) | Expr::Block(stmts, _) => {
                let mut result = Value::Undef;
                for stmt in stmts {
                    result = self.eval(stmt, frame)?;
                }
                Ok(result)
            }

            Expr::Undef(_) => Ok(Value::Undef),
            Expr::Boolean(b, _) => Ok(Value::Boolean(*b)),
            Expr::Integer(n, _) => Ok(Value::Integer(*n)),
            Expr::Float(n, _) => Ok(Value::Float(*n)),

            Expr::Str(StringExpr::Literal(s), _) => Ok(Value::String(s.clone())),
            Expr::Str(StringExpr::Interpolated(parts), span) => {
                self.interpolate(parts, *span, frame)
            }

            Expr::Regexp(pattern, span) => RegexValue::new(pattern)
                .map(Value::Regexp)
                .map_err(|e| {
                    Reported::error(
                        &EVAL_FAILURE,
                        issue_args! { "message" => e.to_string() },
                        Some(location_of(*span)),
                    )
                }),

            Expr::Array(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, frame)?);
                }
                Ok(Value::Array(values))
            }

            Expr::HashLiteral(entries, _) => {
                let mut values = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    values.push((self.eval(k, frame)?, self.eval(v, frame)?));
                }
                Ok(Value::Hash(values))
            }

            Expr::Variable(name, span) => match frame.scope.get(name)? {
                Some(v) => Ok(v),
                None => Err(Reported::error(
                    &EVAL_UNKNOWN_VARIABLE,
                    issue_args! { "name" => name.as_str() },
                    Some(location_of(*span)),
                )),
            },

            Expr::Assignment(lhs, rhs, span) => match lhs.as_ref() {
                Expr::Variable(name, _) => {
                    let value = self.eval(rhs, frame)?;
                    frame.scope.set(name, value.clone());
                    Ok(value)
                }
                _ => Err(Reported::error(
                    &EVAL_ILLEGAL_ASSIGNMENT,
                    vec![],
                    Some(location_of(*span)),
                )),
            },

            Expr::Unary(UnaryOp::Neg, operand, span) => {
                match self.eval(operand, frame)? {
                    Value::Integer(n) => Ok(Value::Integer(-n)),
                    Value::Float(n) => Ok(Value::Float(-n)),
                    other => Err(operator_error("-", &Value::Undef, &other, *span)),
                }
            }

            Expr::Unary(UnaryOp::Not, operand, _) => {
                let value = self.eval(operand, frame)?;
                Ok(Value::Boolean(!truthy(&value)))
            }

            Expr::Binary(op, lhs, rhs, span) => {
                let left = self.eval(lhs, frame)?;
                let right = self.eval(rhs, frame)?;
                apply_binary(*op, left, right, *span)
            }

            Expr::Call { name, args, span } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, frame)?);
                }
                self.call_function(name, values, location_of(*span), frame)
            }

            Expr::QualifiedRef(name, span) => Err(Reported::error(
                &EVAL_UNRESOLVED_REFERENCE,
                issue_args! { "name" => name.as_str() },
                Some(location_of(*span)),
            )),

            Expr::Epp(parts, _) => self.render_epp(parts, frame),

            // Definitions are collected by add_definitions; the nodes
            // themselves evaluate to nothing.
            Expr::FunctionDef(_, _) | Expr::TaskDef(_, _) => Ok(Value::Undef),
        }
    }

    /// Calls a user definition or a registered function.
    pub fn call_function(
        &self,
        name: &str,
        args: Vec<Value>,
        location: Location,
        frame: &mut Frame,
    ) -> Result<Value, Reported> {
        if let Some(def) = self.defs.functions.get(name) {
            return self.call_user_function(def.clone(), args, location, frame);
        }
        if let Some(task) = self.defs.tasks.get(name) {
            return self.call_task(task.clone(), args, location, frame);
        }
        self.registry.call(name, args, location, &*self.logger)
    }

    fn call_user_function(
        &self,
        def: Rc<FunctionDef>,
        args: Vec<Value>,
        location: Location,
        frame: &mut Frame,
    ) -> Result<Value, Reported> {
        if args.len() != def.params.len() {
            return Err(Reported::error(
                &EVAL_ILLEGAL_ARGUMENT_COUNT,
                issue_args! {
                    "function" => def.name.as_str(),
                    "expected" => def.params.len(),
                    "actual" => args.len(),
                },
                Some(location),
            ));
        }
        let mut body_scope = BasicScope::new();
        for (param, arg) in def.params.iter().zip(args) {
            body_scope.set(param, arg);
        }
        let mut child = Frame {
            scope: &mut body_scope,
            depth: frame.depth + 1,
            overrides: frame.overrides,
        };
        let mut result = Value::Undef;
        for stmt in &def.body {
            result = self.eval(stmt, &mut child)?;
        }
        Ok(result)
    }

    fn call_task(
        &self,
        def: Rc<TaskDef>,
        args: Vec<Value>,
        location: Location,
        frame: &mut Frame,
    ) -> Result<Value, Reported> {
        if !args.is_empty() {
            return Err(Reported::error(
                &EVAL_ILLEGAL_ARGUMENT_COUNT,
                issue_args! {
                    "function" => def.name.as_str(),
                    "expected" => 0usize,
                    "actual" => args.len(),
                },
                Some(location),
            ));
        }
        let mut entries = Vec::with_capacity(def.entries.len());
        let mut child = Frame {
            scope: &mut *frame.scope,
            depth: frame.depth + 1,
            overrides: frame.overrides,
        };
        for (k, v) in &def.entries {
            entries.push((self.eval(k, &mut child)?, self.eval(v, &mut child)?));
        }
        Ok(Value::Hash(entries))
    }

    fn interpolate(
        &self,
        parts: &[StrPart],
        span: Span,
        frame: &mut Frame,
    ) -> Result<Value, Reported> {
        let mut out = String::new();
        for part in parts {
            match part {
                StrPart::Lit(s) => out.push_str(s),
                StrPart::Var(name) => match frame.scope.get(name)? {
                    Some(Value::Undef) => {}
                    Some(value) => out.push_str(&value.to_string()),
                    None if settings::get_bool("strict_variables") => {
                        return Err(Reported::error(
                            &EVAL_UNKNOWN_VARIABLE,
                            issue_args! { "name" => name.as_str() },
                            Some(location_of(span)),
                        ))
                    }
                    None => {}
                },
            }
        }
        Ok(Value::String(out))
    }

    fn render_epp(&self, parts: &[EppPart], frame: &mut Frame) -> Result<Value, Reported> {
        let mut out = String::new();
        for part in parts {
            match part {
                EppPart::Text(s) => out.push_str(s),
                EppPart::Render(expr) => {
                    let value = self.eval(expr, frame)?;
                    if !value.is_undef() {
                        out.push_str(&value.to_string());
                    }
                }
                EppPart::Exec(stmts) => {
                    for stmt in stmts {
                        self.eval(stmt, frame)?;
                    }
                }
            }
        }
        Ok(Value::String(out))
    }
}

fn location_of(span: Span) -> Location {
    Location::new("", span.line, span.col)
}

/// Only `undef` and `false` are false.
fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Undef | Value::Boolean(false))
}

fn operator_error(op: &str, left: &Value, right: &Value, span: Span) -> Reported {
    Reported::error(
        &EVAL_OPERATOR_NOT_APPLICABLE,
        issue_args! {
            "operator" => op,
            "left" => left.type_name(),
            "right" => right.type_name(),
        },
        Some(location_of(span)),
    )
}

fn apply_binary(op: BinaryOp, left: Value, right: Value, span: Span) -> Result<Value, Reported> {
    use BinaryOp::*;
    match op {
        Eq => return Ok(Value::Boolean(left.equals(&right))),
        Ne => return Ok(Value::Boolean(!left.equals(&right))),
        _ => {}
    }
    if let (Add, Value::Array(mut a), Value::Array(b)) = (op, left.clone(), right.clone()) {
        a.extend(b);
        return Ok(Value::Array(a));
    }
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                Add => a.checked_add(b),
                Sub => a.checked_sub(b),
                Mul => a.checked_mul(b),
                Div => {
                    if b == 0 {
                        return Err(Reported::error(
                            &EVAL_DIVISION_BY_ZERO,
                            vec![],
                            Some(location_of(span)),
                        ));
                    }
                    a.checked_div(b)
                }
                Rem => {
                    if b == 0 {
                        return Err(Reported::error(
                            &EVAL_DIVISION_BY_ZERO,
                            vec![],
                            Some(location_of(span)),
                        ));
                    }
                    a.checked_rem(b)
                }
                Eq | Ne => unreachable!("handled above"),
            };
            result.map(Value::Integer).ok_or_else(|| {
                Reported::error(
                    &EVAL_FAILURE,
                    issue_args! { "message" => "integer overflow" },
                    Some(location_of(span)),
                )
            })
        }
        (Value::Integer(_), Value::Float(_))
        | (Value::Float(_), Value::Integer(_))
        | (Value::Float(_), Value::Float(_)) => {
            let a = as_f64(&left);
            let b = as_f64(&right);
            let result = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                Eq | Ne => unreachable!("handled above"),
            };
            Ok(Value::Float(result))
        }
        _ => Err(operator_error(op.symbol(), &left, &right, span)),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(n) => *n as f64,
        Value::Float(n) => *n,
        _ => f64::NAN,
    }
}

/// Registers the engine's core functions.
pub fn register_core_functions(registry: &mut FunctionRegistry) {
    FunctionBuilder::new("notice")
        .dispatch(vec![rep(TypeSpec::Any)], |inv| {
            inv.logger.log(LogLevel::Notice, LogEntry::Message(join_args(&inv.args)));
            Ok(Value::Undef)
        })
        .register(registry);

    FunctionBuilder::new("warning")
        .dispatch(vec![rep(TypeSpec::Any)], |inv| {
            inv.logger.log(LogLevel::Warning, LogEntry::Message(join_args(&inv.args)));
            Ok(Value::Undef)
        })
        .register(registry);

    FunctionBuilder::new("fail")
        .dispatch(vec![rep(TypeSpec::Any)], |inv| {
            Err(Reported::error(
                &EVAL_FAILURE,
                issue_args! { "message" => join_args(&inv.args) },
                Some(inv.location.clone()),
            ))
        })
        .register(registry);

    FunctionBuilder::new("sprintf")
        .dispatch(vec![req(TypeSpec::string()), rep(TypeSpec::Any)], |inv| {
            let fmt = inv.args[0].as_str().expect("checked by dispatch");
            format::sprintf(fmt, &inv.args[1..]).map(Value::String)
        })
        .register(registry);
}

fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

static BASE_REGISTRY: Lazy<FunctionRegistry> = Lazy::new(|| {
    let mut registry = FunctionRegistry::new();
    register_core_functions(&mut registry);
    registry
});

/// A copy of the once-initialised base registry with the engine's core
/// functions.
pub fn base_registry() -> FunctionRegistry {
    BASE_REGISTRY.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::logger::ArrayLogger;
    use crate::lang::parser::{parse, ParserOptions};

    fn eval_source(source: &str) -> Result<Value, Reported> {
        let ast = parse("test", source, false, ParserOptions::default()).unwrap();
        let mut evaluator = Evaluator::new(base_registry(), Rc::new(ArrayLogger::new()));
        evaluator.add_definitions(&ast);
        let mut scope = BasicScope::new();
        evaluator.top_evaluate(&ast, &mut scope)
    }

    #[test]
    fn arithmetic() {
        assert!(eval_source("1 + 2").unwrap().equals(&Value::Integer(3)));
        assert!(eval_source("7 / 2").unwrap().equals(&Value::Integer(3)));
        assert!(eval_source("1 + 2 * 3").unwrap().equals(&Value::Integer(7)));
        assert!(eval_source("1.5 + 1").unwrap().equals(&Value::Float(2.5)));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let err = eval_source("1 / 0").unwrap_err();
        assert_eq!(err.code(), "EVAL_DIVISION_BY_ZERO");
    }

    #[test]
    fn assignment_and_interpolation() {
        let out = eval_source("$x = 2 \"got $x\"").unwrap();
        assert!(out.equals(&Value::from("got 2")));
    }

    #[test]
    fn unknown_variable_reference_fails() {
        let _guard = settings::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        settings::reset();
        let err = eval_source("$missing").unwrap_err();
        assert_eq!(err.code(), "EVAL_UNKNOWN_VARIABLE");
        // Interpolation is lenient unless strict_variables is set.
        assert!(eval_source("\"<$missing>\"").unwrap().equals(&Value::from("<>")));
    }

    #[test]
    fn strict_variables_makes_interpolation_fail() {
        let _guard = settings::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        settings::reset();
        settings::set("strict_variables", &Value::Boolean(true));
        let err = eval_source("\"$missing\"").unwrap_err();
        assert_eq!(err.code(), "EVAL_UNKNOWN_VARIABLE");
        settings::reset();
    }

    #[test]
    fn notice_logs_at_notice_level() {
        let ast = parse("test", "notice('hi', 1)", false, ParserOptions::default()).unwrap();
        let logger = Rc::new(ArrayLogger::new());
        let mut evaluator = Evaluator::new(base_registry(), logger.clone());
        let mut scope = BasicScope::new();
        evaluator.top_evaluate(&ast, &mut scope).unwrap();
        let entries = logger.entries(LogLevel::Notice);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message(), "hi 1");
    }

    #[test]
    fn fail_raises_eval_failure() {
        let err = eval_source("fail('boom')").unwrap_err();
        assert_eq!(err.code(), "EVAL_FAILURE");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn user_functions_are_callable() {
        let out = eval_source("function add($a, $b) { $a + $b } add(2, 3)").unwrap();
        assert!(out.equals(&Value::Integer(5)));
    }

    #[test]
    fn user_function_arity_is_checked() {
        let err = eval_source("function id($a) { $a } id()").unwrap_err();
        assert_eq!(err.code(), "EVAL_ILLEGAL_ARGUMENT_COUNT");
    }

    #[test]
    fn tasks_evaluate_to_their_hash() {
        let ast = parse(
            "test",
            "task deploy { command => 'run' } deploy()",
            false,
            ParserOptions { tasks: true, ..Default::default() },
        )
        .unwrap();
        let mut evaluator = Evaluator::new(base_registry(), Rc::new(ArrayLogger::new()));
        evaluator.add_definitions(&ast);
        let mut scope = BasicScope::new();
        let out = evaluator.top_evaluate(&ast, &mut scope).unwrap();
        let expected = Value::Hash(vec![(Value::from("command"), Value::from("run"))]);
        assert!(out.equals(&expected));
    }

    #[test]
    fn epp_templates_render() {
        let ast = parse(
            "test",
            "Hello <% $who = 'spec' %><%= $who %>!",
            false,
            ParserOptions { epp_mode: true, ..Default::default() },
        )
        .unwrap();
        let mut evaluator = Evaluator::new(base_registry(), Rc::new(ArrayLogger::new()));
        let mut scope = BasicScope::new();
        let out = evaluator.top_evaluate(&ast, &mut scope).unwrap();
        assert!(out.equals(&Value::from("Hello spec!")));
    }

    #[test]
    fn operator_type_errors_are_reported() {
        let err = eval_source("1 + 'x'").unwrap_err();
        assert_eq!(err.code(), "EVAL_OPERATOR_NOT_APPLICABLE");
    }
}
