//! Per-node runtime state for the execution phase.
//!
//! A [`TestContext`] exists for every node visit. It memoises realised lazy
//! values, owns the tear-down stack, carries the scope installed by `Scope`
//! inputs, and links to its parent so lookups walk the node chain outward.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::issue_args;
use crate::issues::PSPEC_GET_OF_UNKNOWN_VARIABLE;
use crate::lang::functions::FunctionRegistry;
use crate::lang::issue::Reported;
use crate::lang::parser::ParserOptions;
use crate::lang::scope::{BasicScope, Scope};
use crate::lang::value::{RuntimeValue, Value};
use crate::lazy::LazyValue;
use crate::node::{Input, Node};

/// Marker: a failure has been recorded with the assertions sink and the
/// executable should stop.
#[derive(Debug)]
pub struct Failed;

/// How an executable ends early: an already-recorded assertion failure, or
/// an issue that still needs reporting.
#[derive(Debug)]
pub enum RunError {
    Failed,
    Issue(Reported),
}

impl From<Failed> for RunError {
    fn from(_: Failed) -> Self {
        RunError::Failed
    }
}

impl From<Reported> for RunError {
    fn from(issue: Reported) -> Self {
        RunError::Issue(issue)
    }
}

/// The assertion surface executables see. Both methods return `Err(Failed)`
/// when the test should stop, so bodies can use `?`.
pub trait Assertions {
    fn assert_equals(&mut self, expected: &Value, actual: &Value) -> Result<(), Failed>;
    fn fail(&mut self, message: &str) -> Result<(), Failed>;
}

pub type Executable = Box<dyn Fn(&TestContext, &mut dyn Assertions) -> Result<(), RunError>>;

pub type TearDown = Box<dyn FnOnce()>;

pub struct TestContext<'p> {
    parent: Option<&'p TestContext<'p>>,
    node: Node,
    registry: Rc<FunctionRegistry>,
    accessed: RefCell<HashMap<u64, Value>>,
    tear_downs: RefCell<Vec<TearDown>>,
    scope: RefCell<BasicScope>,
    parser_options: Cell<ParserOptions>,
}

impl<'p> TestContext<'p> {
    pub fn new_root(node: Node, registry: Rc<FunctionRegistry>) -> Self {
        TestContext {
            parent: None,
            node,
            registry,
            accessed: RefCell::new(HashMap::new()),
            tear_downs: RefCell::new(Vec::new()),
            scope: RefCell::new(BasicScope::new()),
            parser_options: Cell::new(ParserOptions::default()),
        }
    }

    pub fn child(&'p self, node: Node) -> TestContext<'p> {
        TestContext {
            parent: Some(self),
            node,
            registry: self.registry.clone(),
            accessed: RefCell::new(HashMap::new()),
            tear_downs: RefCell::new(Vec::new()),
            scope: RefCell::new(BasicScope::new()),
            parser_options: Cell::new(ParserOptions::default()),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The registry example sources are evaluated against.
    pub fn registry(&self) -> &Rc<FunctionRegistry> {
        &self.registry
    }

    /// Ancestor inputs first (parent before child), then this node's own,
    /// each in declaration order.
    pub fn collect_inputs(&self) -> Vec<Rc<Input>> {
        let mut inputs = match self.parent {
            Some(parent) => parent.collect_inputs(),
            None => Vec::new(),
        };
        if let Some(given) = self.node.given() {
            inputs.extend(given.inputs.iter().cloned());
        }
        inputs
    }

    /// The nearest `Let` binding for `name`, searching this node then the
    /// ancestor chain.
    pub fn find_binding(&self, name: &str) -> Option<Rc<LazyValue>> {
        self.node
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.find_binding(name)))
    }

    pub fn get_lazy(&self, name: &str) -> Result<Rc<LazyValue>, Reported> {
        self.find_binding(name).ok_or_else(|| {
            Reported::error(
                &PSPEC_GET_OF_UNKNOWN_VARIABLE,
                issue_args! { "name" => name },
                None,
            )
        })
    }

    /// Realises a lazy value, memoised by id. `Get` values delegate to
    /// their target so the memo key is stable under shadowing.
    pub fn realize(&self, lazy: &Rc<LazyValue>) -> Result<Value, Reported> {
        if let crate::lazy::LazyKind::Get(name) = &lazy.kind {
            let target = self.get_lazy(name)?;
            return self.realize(&target);
        }
        if let Some(value) = self.accessed.borrow().get(&lazy.id()) {
            return Ok(value.clone());
        }
        let value = lazy.get(self)?;
        self.accessed.borrow_mut().insert(lazy.id(), value.clone());
        Ok(value)
    }

    /// Returns a copy of `value` with every runtime-wrapped lazy value
    /// replaced by its realisation, recursing through hashes and arrays.
    pub fn resolve_lazy(&self, value: &Value) -> Result<Value, Reported> {
        match value {
            Value::Runtime(RuntimeValue::Lazy(lazy)) => self.realize(lazy),
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(self.resolve_lazy(item)?);
                }
                Ok(Value::Array(resolved))
            }
            Value::Hash(entries) => {
                let mut resolved = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    resolved.push((self.resolve_lazy(k)?, self.resolve_lazy(v)?));
                }
                Ok(Value::Hash(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    pub fn register_tear_down(&self, tear_down: TearDown) {
        self.tear_downs.borrow_mut().push(tear_down);
    }

    /// Drains the registered tear-downs in reverse registration order.
    pub fn drain_tear_downs(&self) -> Vec<TearDown> {
        let mut drained: Vec<TearDown> = self.tear_downs.borrow_mut().drain(..).collect();
        drained.reverse();
        drained
    }

    pub fn set_scope(&self, scope: BasicScope) {
        *self.scope.borrow_mut() = scope;
    }

    /// Runs `body` with a scope view that resolves `Let` bindings first and
    /// falls back to the installed variable scope.
    pub fn with_scope<R>(&self, body: impl FnOnce(&mut dyn Scope) -> R) -> R {
        let mut inner = self.scope.borrow_mut();
        let mut lazy_scope = LazyScope { ctx: self, inner: &mut inner };
        body(&mut lazy_scope)
    }

    pub fn parser_options(&self) -> ParserOptions {
        self.parser_options.get()
    }

    pub fn set_parser_options(&self, options: ParserOptions) {
        self.parser_options.set(options);
    }

    /// How many lazy values this context has realised. Used to observe
    /// memoisation.
    pub fn accessed_count(&self) -> usize {
        self.accessed.borrow().len()
    }
}

/// Variable view for example evaluation: lazy bindings shadow the basic
/// scope.
struct LazyScope<'a, 'p> {
    ctx: &'a TestContext<'p>,
    inner: &'a mut BasicScope,
}

impl Scope for LazyScope<'_, '_> {
    fn get(&self, name: &str) -> Result<Option<Value>, Reported> {
        if let Some(binding) = self.ctx.find_binding(name) {
            return self.ctx.realize(&binding).map(Some);
        }
        self.inner.get(name)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.inner.set(name, value);
    }
}

/// One runnable leaf: an Example bound to its executable body.
pub struct TestExecutable {
    pub node: Node,
    pub body: Executable,
}

/// A named grouping of nested tests; groups never execute body code.
pub struct TestGroup {
    pub node: Node,
    pub tests: Vec<Test>,
}

pub enum Test {
    Executable(TestExecutable),
    Group(TestGroup),
}

impl Test {
    pub fn name(&self) -> &str {
        self.node().description()
    }

    pub fn node(&self) -> &Node {
        match self {
            Test::Executable(t) => &t.node,
            Test::Group(g) => &g.node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::eval::base_registry;
    use crate::node::Example;

    fn example(name: &str, lets: Vec<(String, Rc<LazyValue>)>) -> Node {
        Node::Example(Example::new(name.to_string(), None, lets, vec![]))
    }

    fn registry() -> Rc<FunctionRegistry> {
        Rc::new(base_registry())
    }

    #[test]
    fn realization_is_memoised_per_context() {
        let lazy = LazyValue::generic(Value::from(42i64));
        let ctx = TestContext::new_root(example("e", vec![]), registry());
        ctx.realize(&lazy).unwrap();
        ctx.realize(&lazy).unwrap();
        assert_eq!(ctx.accessed_count(), 1);
    }

    #[test]
    fn bindings_shadow_outward() {
        let outer = example("outer", vec![("x".to_string(), LazyValue::generic(Value::from(1i64)))]);
        let inner = example("inner", vec![("x".to_string(), LazyValue::generic(Value::from(2i64)))]);
        let root = TestContext::new_root(outer, registry());
        let child = root.child(inner);
        let got = child.realize(&LazyValue::new(crate::lazy::LazyKind::Get("x".into()))).unwrap();
        assert!(got.equals(&Value::Integer(2)));
    }

    #[test]
    fn get_of_unknown_variable_fails() {
        let ctx = TestContext::new_root(example("e", vec![]), registry());
        let err = ctx.get_lazy("missing").unwrap_err();
        assert_eq!(err.code(), "PSPEC_GET_OF_UNKNOWN_VARIABLE");
    }

    #[test]
    fn tear_downs_drain_in_reverse_order() {
        use std::cell::RefCell;
        let order: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let ctx = TestContext::new_root(example("e", vec![]), registry());
        for i in 0..3u8 {
            let order = order.clone();
            ctx.register_tear_down(Box::new(move || order.borrow_mut().push(i)));
        }
        for td in ctx.drain_tear_downs() {
            td();
        }
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }
}
