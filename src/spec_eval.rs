//! The construction-phase evaluator.
//!
//! A thin interception layer over the engine evaluator. It watches
//! top-level statements for runtime-wrapped Nodes (the discovered roots),
//! resolves bare references that name known issue codes, and rewrites the
//! reserved construction names `Foo` to `PSpec::Foo` for both call functors
//! and bare references (a bare reference invokes the zero-argument
//! dispatch, which is how `Evaluates_ok` works without parentheses).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::constructors::is_reserved;
use crate::context::Test;
use crate::issues::issue_for_code;
use crate::lang::ast::{Expr, Span};
use crate::lang::eval::{EvalOverride, Evaluator, Frame};
use crate::lang::functions::FunctionRegistry;
use crate::lang::issue::{Location, Reported};
use crate::lang::logger::StdLogger;
use crate::lang::scope::BasicScope;
use crate::lang::value::{RuntimeValue, Value};
use crate::node::Node;

#[derive(Default)]
pub struct SpecEval {
    nodes: RefCell<Vec<Node>>,
    depth: Cell<usize>,
}

impl SpecEval {
    pub fn new() -> Self {
        SpecEval::default()
    }

    /// Runs the construction phase over a parsed spec file and returns one
    /// test per discovered root node, in declaration order.
    pub fn create_tests(
        &self,
        expr: &Expr,
        registry: &FunctionRegistry,
    ) -> Result<Vec<Test>, Reported> {
        let mut evaluator = Evaluator::new(registry.clone(), Rc::new(StdLogger));
        evaluator.add_definitions(expr);
        let mut scope = BasicScope::new();
        evaluator.top_evaluate_with(expr, &mut scope, self)?;
        Ok(self.nodes.borrow().iter().map(Node::create_test).collect())
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.borrow().clone()
    }

    fn eval_block(
        &self,
        ev: &Evaluator,
        stmts: &[Expr],
        frame: &mut Frame,
    ) -> Result<Value, Reported> {
        // Only statements of the outermost block become roots.
        let top_level = self.depth.get() == 0;
        self.depth.set(self.depth.get() + 1);
        let result = self.eval_statements(ev, stmts, frame, top_level);
        self.depth.set(self.depth.get() - 1);
        result
    }

    fn eval_statements(
        &self,
        ev: &Evaluator,
        stmts: &[Expr],
        frame: &mut Frame,
        top_level: bool,
    ) -> Result<Value, Reported> {
        let mut last = Value::Undef;
        for stmt in stmts {
            last = ev.eval(stmt, frame)?;
            if top_level {
                if let Value::Runtime(RuntimeValue::Node(node)) = &last {
                    self.nodes.borrow_mut().push(node.clone());
                }
            }
        }
        Ok(last)
    }

    fn eval_qref(
        &self,
        ev: &Evaluator,
        expr: &Expr,
        name: &str,
        span: Span,
        frame: &mut Frame,
    ) -> Result<Value, Reported> {
        if let Some(issue) = issue_for_code(name) {
            return Ok(Value::Runtime(RuntimeValue::Issue(issue)));
        }
        if is_reserved(name) {
            return ev.call_function(
                &format!("PSpec::{}", name),
                vec![],
                location_of(span),
                frame,
            );
        }
        ev.base_eval(expr, frame)
    }
}

impl EvalOverride for SpecEval {
    fn eval(
        &self,
        ev: &Evaluator,
        expr: &Expr,
        frame: &mut Frame,
    ) -> Option<Result<Value, Reported>> {
        match expr {
            Expr::Program(stmts, _) | Expr::Block(stmts, _) => {
                Some(self.eval_block(ev, stmts, frame))
            }
            Expr::QualifiedRef(name, span) => {
                Some(self.eval_qref(ev, expr, name, *span, frame))
            }
            Expr::Call { name, args, span } if is_reserved(name) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match ev.eval(arg, frame) {
                        Ok(v) => values.push(v),
                        Err(e) => return Some(Err(e)),
                    }
                }
                Some(ev.call_function(
                    &format!("PSpec::{}", name),
                    values,
                    location_of(*span),
                    frame,
                ))
            }
            _ => None,
        }
    }
}

fn location_of(span: Span) -> Location {
    Location::new("", span.line, span.col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors::register_constructors;
    use crate::lang::eval::base_registry;
    use crate::lang::parser::{parse, ParserOptions};

    fn construct(source: &str) -> Result<Vec<Node>, Reported> {
        let ast = parse("spec", source, false, ParserOptions::default()).unwrap();
        let mut registry = base_registry();
        register_constructors(&mut registry);
        let spec_eval = SpecEval::new();
        spec_eval.create_tests(&ast, &registry)?;
        Ok(spec_eval.nodes())
    }

    #[test]
    fn top_level_nodes_become_roots_in_order() {
        let nodes = construct(
            "Example('one', Given('1'), Evaluates_ok()) \
             Example('two', Given('2'), Evaluates_ok())",
        )
        .unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].description(), "one");
        assert_eq!(nodes[1].description(), "two");
    }

    #[test]
    fn nested_nodes_are_not_promoted() {
        let nodes = construct(
            "Examples('group', Example('leaf', Given('1'), Evaluates_ok()))",
        )
        .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].description(), "group");
    }

    #[test]
    fn bare_references_invoke_zero_argument_constructors() {
        let nodes = construct("Example('bare', Given('1'), Evaluates_ok)").unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn issue_codes_resolve_to_descriptors() {
        let nodes = construct(
            "Example('e', Given('$x'), Evaluates_with(Error(EVAL_UNKNOWN_VARIABLE)))",
        )
        .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn unknown_references_fail_construction() {
        let err = construct("Example('e', Given('1'), No_such_thing)").unwrap_err();
        assert_eq!(err.code(), "EVAL_UNRESOLVED_REFERENCE");
    }

    #[test]
    fn badly_typed_constructor_arguments_fail_construction() {
        let err = construct("Example(42, Evaluates_ok())").unwrap_err();
        assert_eq!(err.code(), "EVAL_ILLEGAL_ARGUMENT_TYPE");
    }
}
