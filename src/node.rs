//! The test tree: nodes, inputs, and results.
//!
//! Construction builds this tree; execution walks it. An `Examples` group
//! nests children; an `Example` leaf owns results, and every source
//! fragment × result pair becomes one executable.

use std::rc::Rc;

use crate::context::{Assertions, Executable, Failed, RunError, Test, TestContext, TestExecutable, TestGroup};
use crate::expectation::{validate_expectations, Expectation};
use crate::issue_args;
use crate::issues::PSPEC_VALUE_NOT_HASH;
use crate::lang::ast::Expr;
use crate::lang::eval::Evaluator;
use crate::lang::issue::{Location, Reported, Severity};
use crate::lang::logger::ArrayLogger;
use crate::lang::parser::{parse, ParserOptions};
use crate::lang::scope::BasicScope;
use crate::lang::settings;
use crate::lang::validator::{validate, Strictness};
use crate::lang::value::Value;
use crate::lazy::LazyValue;
use crate::pn::parse_pn;

/// State shared by both node variants.
#[derive(Debug)]
pub struct NodeCore {
    description: String,
    given: Option<Rc<Given>>,
    values: Vec<(String, Rc<LazyValue>)>,
}

impl NodeCore {
    fn new(
        description: String,
        given: Option<Rc<Given>>,
        values: Vec<(String, Rc<LazyValue>)>,
    ) -> Self {
        NodeCore { description, given, values }
    }
}

#[derive(Debug)]
pub struct Example {
    core: NodeCore,
    results: Vec<Rc<SpecResult>>,
}

impl Example {
    pub fn new(
        description: String,
        given: Option<Rc<Given>>,
        values: Vec<(String, Rc<LazyValue>)>,
        results: Vec<Rc<SpecResult>>,
    ) -> Rc<Example> {
        Rc::new(Example { core: NodeCore::new(description, given, values), results })
    }

    pub fn results(&self) -> &[Rc<SpecResult>] {
        &self.results
    }

    fn create_test(self: &Rc<Self>) -> Test {
        let me = self.clone();
        let body: Executable = Box::new(move |tc: &TestContext, asserts: &mut dyn Assertions| {
            let mut executables: Vec<Executable> = Vec::new();
            for input in tc.collect_inputs() {
                for result in &me.results {
                    executables.extend(input.create_tests(result));
                }
            }
            for executable in &executables {
                executable(tc, asserts)?;
            }
            Ok(())
        });
        Test::Executable(TestExecutable { node: Node::Example(self.clone()), body })
    }
}

#[derive(Debug)]
pub struct ExamplesGroup {
    core: NodeCore,
    children: Vec<Node>,
}

impl ExamplesGroup {
    pub fn new(
        description: String,
        given: Option<Rc<Given>>,
        values: Vec<(String, Rc<LazyValue>)>,
        children: Vec<Node>,
    ) -> Rc<ExamplesGroup> {
        Rc::new(ExamplesGroup { core: NodeCore::new(description, given, values), children })
    }

    fn create_test(self: &Rc<Self>) -> Test {
        let tests = self.children.iter().map(Node::create_test).collect();
        Test::Group(TestGroup { node: Node::Group(self.clone()), tests })
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Example(Rc<Example>),
    Group(Rc<ExamplesGroup>),
}

impl Node {
    fn core(&self) -> &NodeCore {
        match self {
            Node::Example(e) => &e.core,
            Node::Group(g) => &g.core,
        }
    }

    pub fn description(&self) -> &str {
        &self.core().description
    }

    pub fn given(&self) -> Option<&Rc<Given>> {
        self.core().given.as_ref()
    }

    /// The `Let` binding declared on this node, if any.
    pub fn get(&self, name: &str) -> Option<Rc<LazyValue>> {
        self.core()
            .values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn create_test(&self) -> Test {
        match self {
            Node::Example(e) => e.create_test(),
            Node::Group(g) => g.create_test(),
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Example(a), Node::Example(b)) => Rc::ptr_eq(a, b),
            (Node::Group(a), Node::Group(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Given {
    pub inputs: Vec<Rc<Input>>,
}

/// One piece of example source. `Epp_source` fragments set `epp`.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub epp: bool,
    pub body: FragmentBody,
}

#[derive(Debug, Clone)]
pub enum FragmentBody {
    Literal(String),
    Lazy(Rc<LazyValue>),
}

#[derive(Debug)]
pub enum Input {
    /// Source fragments; each fragment runs every result.
    Source(Vec<Fragment>),
    /// Source with a path carried through for diagnostic anchoring.
    NamedSource { path: String, code: String },
    /// Initial variable scope, installed before the example body.
    Scope(Value),
    /// Process-wide settings, written before the example body.
    Settings(Value),
    /// Parser feature flags for the example's sources.
    ParserOptions(ParserOptions),
    /// A lazy value realised (fixtures materialised) before the body.
    Fixture(Rc<LazyValue>),
}

impl Input {
    /// The executables this input contributes for one expected result.
    /// Sources produce one per fragment; the other inputs produce a single
    /// context-mutating pre-step.
    pub fn create_tests(&self, result: &Rc<SpecResult>) -> Vec<Executable> {
        match self {
            Input::Source(fragments) => fragments
                .iter()
                .map(|fragment| result.create_test(String::new(), fragment.clone()))
                .collect(),

            Input::NamedSource { path, code } => vec![result.create_test(
                path.clone(),
                Fragment { epp: false, body: FragmentBody::Literal(code.clone()) },
            )],

            Input::Scope(value) => {
                let value = value.clone();
                vec![Box::new(move |tc: &TestContext, _: &mut dyn Assertions| {
                    let resolved = tc.resolve_lazy(&value)?;
                    match resolved.as_hash() {
                        Some(entries) => {
                            tc.set_scope(BasicScope::from_entries(entries));
                            Ok(())
                        }
                        None => Err(RunError::Issue(Reported::error(
                            &PSPEC_VALUE_NOT_HASH,
                            issue_args! { "type" => "Scope" },
                            None,
                        ))),
                    }
                })]
            }

            Input::Settings(value) => {
                let value = value.clone();
                vec![Box::new(move |tc: &TestContext, _: &mut dyn Assertions| {
                    let resolved = tc.resolve_lazy(&value)?;
                    match resolved.as_hash() {
                        Some(entries) => {
                            for (k, v) in entries {
                                settings::set(&k.to_string(), v);
                            }
                            Ok(())
                        }
                        None => Err(RunError::Issue(Reported::error(
                            &PSPEC_VALUE_NOT_HASH,
                            issue_args! { "type" => "Settings" },
                            None,
                        ))),
                    }
                })]
            }

            Input::ParserOptions(options) => {
                let options = *options;
                vec![Box::new(move |tc: &TestContext, _: &mut dyn Assertions| {
                    tc.set_parser_options(options);
                    Ok(())
                })]
            }

            Input::Fixture(lazy) => {
                let lazy = lazy.clone();
                vec![Box::new(move |tc: &TestContext, _: &mut dyn Assertions| {
                    tc.realize(&lazy)?;
                    Ok(())
                })]
            }
        }
    }

    /// Counts the executables that exercise a result, i.e. source
    /// fragments. Pre-step inputs contribute none.
    pub fn fragment_count(&self) -> usize {
        match self {
            Input::Source(fragments) => fragments.len(),
            Input::NamedSource { .. } => 1,
            _ => 0,
        }
    }
}

/// Expected outcomes bound to an example.
#[derive(Debug)]
pub enum SpecResult {
    /// Assert the PN form of the parsed source.
    Parse { expected: String, location: Location },
    /// Assert the evaluated value.
    Evaluation { expected: Value },
    /// Match evaluation's logs and issues against expectations.
    EvaluatesWith { expectations: Vec<Rc<Expectation>> },
    /// Match parse+validate issues against expectations.
    ValidatesWith { expectations: Vec<Rc<Expectation>> },
}

impl SpecResult {
    /// Binds this result to one source fragment as a runnable body.
    pub fn create_test(self: &Rc<Self>, path: String, fragment: Fragment) -> Executable {
        let result = self.clone();
        Box::new(move |tc: &TestContext, asserts: &mut dyn Assertions| {
            result.run(tc, asserts, &path, &fragment)
        })
    }

    fn run(
        &self,
        tc: &TestContext,
        asserts: &mut dyn Assertions,
        path: &str,
        fragment: &Fragment,
    ) -> Result<(), RunError> {
        let source = resolve_fragment(tc, fragment)?;
        let options = tc.parser_options().with_epp(fragment.epp);

        match self {
            SpecResult::Parse { expected, location } => {
                let (ast, issues) = parse_and_validate(path, &source, true, options);
                fail_on_error(asserts, &issues)?;
                let ast = ast.expect("errors were checked");
                let expected = parse_pn(expected, location)?;
                let actual = ast.strip_single().to_pn();
                asserts.assert_equals(
                    &Value::from(expected.to_string()),
                    &Value::from(actual.to_string()),
                )?;
                Ok(())
            }

            SpecResult::Evaluation { expected } => {
                let (ast, issues) = parse_and_validate(path, &source, false, options);
                fail_on_error(asserts, &issues)?;
                let ast = ast.expect("errors were checked");
                let logger = Rc::new(ArrayLogger::new());
                let mut evaluator = Evaluator::new((**tc.registry()).clone(), logger);
                evaluator.add_definitions(&ast);
                match tc.with_scope(|scope| evaluator.top_evaluate(&ast, scope)) {
                    Ok(actual) => {
                        let expected = tc.resolve_lazy(expected)?;
                        asserts.assert_equals(&expected, &actual)?;
                        Ok(())
                    }
                    Err(issue) => {
                        asserts.fail(&issue.to_string())?;
                        Ok(())
                    }
                }
            }

            SpecResult::EvaluatesWith { expectations } => {
                let (ast, mut issues) = parse_and_validate(path, &source, false, options);
                let logger = Rc::new(ArrayLogger::new());
                if !has_error(&issues) {
                    let ast = ast.expect("errors were checked");
                    let mut evaluator = Evaluator::new((**tc.registry()).clone(), logger.clone());
                    evaluator.add_definitions(&ast);
                    if let Err(issue) = tc.with_scope(|scope| evaluator.top_evaluate(&ast, scope)) {
                        issues.push(issue);
                    }
                }
                validate_expectations(asserts, expectations, &issues, &logger)?;
                Ok(())
            }

            SpecResult::ValidatesWith { expectations } => {
                let (_, issues) = parse_and_validate(path, &source, true, options);
                validate_expectations(asserts, expectations, &issues, &ArrayLogger::new())?;
                Ok(())
            }
        }
    }
}

fn resolve_fragment(tc: &TestContext, fragment: &Fragment) -> Result<String, Reported> {
    match &fragment.body {
        FragmentBody::Literal(code) => Ok(code.clone()),
        FragmentBody::Lazy(lazy) => Ok(tc.realize(lazy)?.to_string()),
    }
}

/// Parses and validates one source. A parse failure becomes the single
/// issue of the result; validation runs at `Error` strictness.
pub fn parse_and_validate(
    path: &str,
    source: &str,
    single_expr: bool,
    options: ParserOptions,
) -> (Option<Expr>, Vec<Reported>) {
    match parse(path, source, single_expr, options) {
        Ok(ast) => {
            let issues = validate(&ast, Strictness::Error);
            (Some(ast), issues)
        }
        Err(issue) => (None, vec![issue]),
    }
}

pub fn has_error(issues: &[Reported]) -> bool {
    issues.iter().any(|i| i.severity() == Severity::Error)
}

/// Fails the test with the first error-severity issue, if any.
pub fn fail_on_error(asserts: &mut dyn Assertions, issues: &[Reported]) -> Result<(), Failed> {
    match issues.iter().find(|i| i.severity() == Severity::Error) {
        Some(issue) => asserts.fail(&issue.to_string()),
        None => Ok(()),
    }
}
