//! The reserved construction-phase functions.
//!
//! Each reserved name registers a typed dispatch under `PSpec::<Name>`.
//! Handlers build the runtime tree objects; argument types are validated by
//! the registry before a handler runs, so a badly typed call fails the spec
//! file's construction phase with an illegal-argument issue.

use std::rc::Rc;

use crate::expectation::{
    Exclude, Expectation, Include, IssueArgMatch, LevelExpectation, Matcher,
};
use crate::issue_args;
use crate::lang::format;
use crate::lang::functions::{
    opt, rep, req, FunctionBuilder, FunctionRegistry, Invocation, RuntimeKind, TypeSpec,
};
use crate::lang::issue::{Reported, EVAL_ILLEGAL_ARGUMENT_COUNT, EVAL_ILLEGAL_ARGUMENT_TYPE};
use crate::lang::logger::LogLevel;
use crate::lang::parser::ParserOptions;
use crate::lang::value::{RuntimeValue, Value};
use crate::lazy::{LazyKind, LazyValue, LazyValueLet};
use crate::node::{Example, ExamplesGroup, Fragment, FragmentBody, Given, Input, Node, SpecResult};

/// The names the spec evaluator rewrites to `PSpec::<Name>`.
pub const RESERVED_NAMES: [&str; 29] = [
    "Contain",
    "Directory",
    "Epp_source",
    "Error",
    "Evaluates_ok",
    "Evaluates_to",
    "Evaluates_with",
    "Example",
    "Examples",
    "Exclude",
    "File",
    "Format",
    "Get",
    "Given",
    "Include",
    "Issue",
    "Let",
    "Match",
    "Named_source",
    "Notice",
    "Parser_options",
    "Parses_to",
    "Scope",
    "Settings",
    "Source",
    "Unindent",
    "Validates_ok",
    "Validates_with",
    "Warning",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

fn matchers_type() -> TypeSpec {
    TypeSpec::variant(vec![
        TypeSpec::string(),
        TypeSpec::Regexp,
        TypeSpec::runtime(RuntimeKind::Issue),
        TypeSpec::runtime(RuntimeKind::Matcher),
    ])
}

fn expectations_type() -> TypeSpec {
    TypeSpec::variant(vec![
        TypeSpec::string(),
        TypeSpec::Regexp,
        TypeSpec::runtime(RuntimeKind::Issue),
        TypeSpec::runtime(RuntimeKind::Matcher),
        TypeSpec::runtime(RuntimeKind::Include),
        TypeSpec::runtime(RuntimeKind::Exclude),
    ])
}

fn illegal_argument(name: &str, index: usize, expected: &str, actual: &Value) -> Reported {
    Reported::error(
        &EVAL_ILLEGAL_ARGUMENT_TYPE,
        issue_args! {
            "function" => name,
            "index" => index,
            "expected" => expected,
            "actual" => actual.type_name(),
        },
        None,
    )
}

/// One matcher from a `Variant[String, Regexp, Issue, Match]` argument.
fn make_matcher(name: &str, index: usize, arg: &Value) -> Result<Rc<Matcher>, Reported> {
    match arg {
        Value::String(s) => Ok(Rc::new(Matcher::exact(s))),
        Value::Regexp(re) => Ok(Rc::new(Matcher::Regex(re.clone()))),
        Value::Runtime(RuntimeValue::Issue(issue)) => {
            Ok(Rc::new(Matcher::Issue { issue, args: None }))
        }
        Value::Runtime(RuntimeValue::Matcher(m)) => Ok(m.clone()),
        other => Err(illegal_argument(
            name,
            index,
            "Variant[String, Regexp, Issue, Match]",
            other,
        )),
    }
}

fn make_issue_arg_match(arg: &Value) -> IssueArgMatch {
    match arg {
        Value::String(s) => IssueArgMatch::Matcher(Rc::new(Matcher::exact(s))),
        Value::Regexp(re) => IssueArgMatch::Matcher(Rc::new(Matcher::Regex(re.clone()))),
        Value::Runtime(RuntimeValue::Matcher(m)) => IssueArgMatch::Matcher(m.clone()),
        other => IssueArgMatch::Value(other.clone()),
    }
}

/// Builds the per-level expectations of `Notice`/`Warning`/`Error` from a
/// `Variant[String, Regexp, Issue, Match, Include, Exclude]` argument list.
fn make_level_expectations(
    name: &str,
    level: LogLevel,
    args: &[Value],
) -> Result<Vec<LevelExpectation>, Reported> {
    let mut levels = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        match arg {
            Value::Runtime(RuntimeValue::Include(include)) => levels.push(LevelExpectation {
                level,
                includes: vec![include.clone()],
                excludes: vec![],
            }),
            Value::Runtime(RuntimeValue::Exclude(exclude)) => levels.push(LevelExpectation {
                level,
                includes: vec![],
                excludes: vec![exclude.clone()],
            }),
            other => {
                let matcher = make_matcher(name, index, other)?;
                levels.push(LevelExpectation::including(level, matcher));
            }
        }
    }
    Ok(levels)
}

fn wrap_result(result: SpecResult) -> Value {
    Value::Runtime(RuntimeValue::Result(Rc::new(result)))
}

fn wrap_input(input: Input) -> Value {
    Value::Runtime(RuntimeValue::Input(Rc::new(input)))
}

fn wrap_lazy(kind: LazyKind) -> Value {
    Value::Runtime(RuntimeValue::Lazy(LazyValue::new(kind)))
}

/// Turns a `Let` argument into a lazy value, passing existing lazies
/// through and wrapping anything else as a generic value.
fn to_lazy(value: &Value) -> Rc<LazyValue> {
    match value {
        Value::Runtime(RuntimeValue::Lazy(lazy)) => lazy.clone(),
        other => LazyValue::generic(other.clone()),
    }
}

fn expectation_results(
    name: &'static str,
    inv: &Invocation,
) -> Result<Vec<Rc<Expectation>>, Reported> {
    // First form: expectation objects. Second form: bare matchers that
    // stand for error-level expectations.
    if inv
        .args
        .iter()
        .all(|a| matches!(a, Value::Runtime(RuntimeValue::Expectation(_))))
    {
        Ok(inv
            .args
            .iter()
            .map(|a| match a {
                Value::Runtime(RuntimeValue::Expectation(e)) => e.clone(),
                _ => unreachable!("checked above"),
            })
            .collect())
    } else {
        let levels = make_level_expectations(name, LogLevel::Err, &inv.args)?;
        Ok(vec![Rc::new(Expectation { levels })])
    }
}

fn flatten_nodes(name: &str, args: &[Value], nodes: &mut Vec<Node>) -> Result<(), Reported> {
    for (index, arg) in args.iter().enumerate() {
        match arg {
            Value::Runtime(RuntimeValue::Node(node)) => nodes.push(node.clone()),
            Value::Array(items) => flatten_nodes(name, items, nodes)?,
            other => {
                return Err(illegal_argument(name, index, "Variant[Node, Array[Node]]", other))
            }
        }
    }
    Ok(())
}

/// Registers every reserved constructor into `registry`.
pub fn register_constructors(registry: &mut FunctionRegistry) {
    let node_type = TypeSpec::runtime(RuntimeKind::Node);
    let lazy_type = TypeSpec::runtime(RuntimeKind::Lazy);

    FunctionBuilder::new("PSpec::Example")
        .dispatch(
            vec![
                req(TypeSpec::string()),
                rep(TypeSpec::variant(vec![
                    TypeSpec::runtime(RuntimeKind::Let),
                    TypeSpec::runtime(RuntimeKind::Given),
                    TypeSpec::runtime(RuntimeKind::Result),
                ])),
            ],
            |inv| {
                let description = inv.args[0].as_str().expect("checked by dispatch").to_string();
                let mut lets = Vec::new();
                let mut given: Option<Rc<Given>> = None;
                let mut results = Vec::new();
                for arg in &inv.args[1..] {
                    match arg.as_runtime().expect("checked by dispatch") {
                        RuntimeValue::Let(l) => lets.push((l.name.clone(), l.value.clone())),
                        // The first Given wins; later ones are ignored.
                        RuntimeValue::Given(g) => {
                            if given.is_none() {
                                given = Some(g.clone());
                            }
                        }
                        RuntimeValue::Result(r) => results.push(r.clone()),
                        _ => unreachable!("checked by dispatch"),
                    }
                }
                if results.is_empty() {
                    return Err(Reported::error(
                        &EVAL_ILLEGAL_ARGUMENT_COUNT,
                        issue_args! {
                            "function" => "PSpec::Example",
                            "expected" => "at least one Result",
                            "actual" => "none",
                        },
                        Some(inv.location.clone()),
                    ));
                }
                let example = Example::new(description, given, lets, results);
                Ok(Value::Runtime(RuntimeValue::Node(Node::Example(example))))
            },
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Examples")
        .dispatch(
            vec![
                req(TypeSpec::string()),
                rep(TypeSpec::variant(vec![
                    node_type.clone(),
                    TypeSpec::array_of(TypeSpec::Any),
                    TypeSpec::runtime(RuntimeKind::Let),
                    TypeSpec::runtime(RuntimeKind::Given),
                ])),
            ],
            |inv| {
                let description = inv.args[0].as_str().expect("checked by dispatch").to_string();
                let mut lets = Vec::new();
                let mut given: Option<Rc<Given>> = None;
                let mut others = Vec::new();
                for arg in &inv.args[1..] {
                    match arg {
                        Value::Runtime(RuntimeValue::Let(l)) => {
                            lets.push((l.name.clone(), l.value.clone()))
                        }
                        Value::Runtime(RuntimeValue::Given(g)) => given = Some(g.clone()),
                        other => others.push(other.clone()),
                    }
                }
                let mut children = Vec::new();
                flatten_nodes("PSpec::Examples", &others, &mut children)?;
                let group = ExamplesGroup::new(description, given, lets, children);
                Ok(Value::Runtime(RuntimeValue::Node(Node::Group(group))))
            },
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Given")
        .dispatch(
            vec![rep(TypeSpec::variant(vec![
                TypeSpec::string(),
                TypeSpec::runtime(RuntimeKind::Input),
                lazy_type.clone(),
            ]))],
            |inv| {
                let mut inputs = Vec::with_capacity(inv.args.len());
                for arg in &inv.args {
                    match arg {
                        Value::String(code) => inputs.push(Rc::new(Input::Source(vec![Fragment {
                            epp: false,
                            body: FragmentBody::Literal(code.clone()),
                        }]))),
                        Value::Runtime(RuntimeValue::Input(input)) => inputs.push(input.clone()),
                        Value::Runtime(RuntimeValue::Lazy(lazy)) => {
                            inputs.push(Rc::new(Input::Fixture(lazy.clone())))
                        }
                        _ => unreachable!("checked by dispatch"),
                    }
                }
                Ok(Value::Runtime(RuntimeValue::Given(Rc::new(Given { inputs }))))
            },
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Source")
        .dispatch(
            vec![rep(TypeSpec::variant(vec![TypeSpec::string(), lazy_type.clone()]))],
            |inv| Ok(wrap_input(Input::Source(fragments_of(&inv.args, false)))),
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Epp_source")
        .dispatch(
            vec![rep(TypeSpec::variant(vec![TypeSpec::string(), lazy_type.clone()]))],
            |inv| Ok(wrap_input(Input::Source(fragments_of(&inv.args, true)))),
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Named_source")
        .dispatch(vec![req(TypeSpec::string()), req(TypeSpec::string())], |inv| {
            Ok(wrap_input(Input::NamedSource {
                path: inv.args[0].as_str().expect("checked by dispatch").to_string(),
                code: inv.args[1].as_str().expect("checked by dispatch").to_string(),
            }))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Scope")
        .dispatch(
            vec![req(TypeSpec::hash_of(
                TypeSpec::pattern(r"\A[a-z_]\w*\z"),
                TypeSpec::Any,
            ))],
            |inv| Ok(wrap_input(Input::Scope(inv.args[0].clone()))),
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Settings")
        .dispatch(vec![req(TypeSpec::Any)], |inv| {
            Ok(wrap_input(Input::Settings(inv.args[0].clone())))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Parser_options")
        .dispatch(
            vec![req(TypeSpec::hash_of(TypeSpec::pattern(r"[a-z_]*"), TypeSpec::Data))],
            |inv| {
                let entries = inv.args[0].as_hash().expect("checked by dispatch");
                let mut options = ParserOptions::default();
                for (key, value) in entries {
                    match key.to_string().as_str() {
                        "tasks" => options.tasks = require_flag("tasks", value)?,
                        "hex_escapes" => options.hex_escapes = require_flag("hex_escapes", value)?,
                        "backtick_strings" => {
                            options.backtick_strings = require_flag("backtick_strings", value)?
                        }
                        // Unrecognized keys are tolerated.
                        _ => {}
                    }
                }
                Ok(wrap_input(Input::ParserOptions(options)))
            },
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Unindent")
        .dispatch(vec![req(TypeSpec::string())], |inv| {
            let text = inv.args[0].as_str().expect("checked by dispatch");
            Ok(Value::String(format::unindent(text)))
        })
        .register(registry);

    // Matchers.

    FunctionBuilder::new("PSpec::Include")
        .dispatch(vec![rep(matchers_type())], |inv| {
            let matchers = all_matchers("PSpec::Include", &inv.args)?;
            Ok(Value::Runtime(RuntimeValue::Include(Rc::new(Include { matchers }))))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Exclude")
        .dispatch(vec![rep(matchers_type())], |inv| {
            let matchers = all_matchers("PSpec::Exclude", &inv.args)?;
            Ok(Value::Runtime(RuntimeValue::Exclude(Rc::new(Exclude { matchers }))))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Contain")
        .dispatch(vec![req(TypeSpec::string())], |inv| {
            let text = inv.args[0].as_str().expect("checked by dispatch");
            Ok(Value::Runtime(RuntimeValue::Matcher(Rc::new(Matcher::contain(text)))))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Match")
        .dispatch(
            vec![req(TypeSpec::variant(vec![
                TypeSpec::string(),
                TypeSpec::Regexp,
                TypeSpec::runtime(RuntimeKind::Issue),
            ]))],
            |inv| {
                let matcher = make_matcher("PSpec::Match", 0, &inv.args[0])?;
                Ok(Value::Runtime(RuntimeValue::Matcher(matcher)))
            },
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Issue")
        .dispatch(
            vec![
                req(TypeSpec::runtime(RuntimeKind::Issue)),
                opt(TypeSpec::hash_of(TypeSpec::string(), TypeSpec::Any)),
            ],
            |inv| {
                let issue = match inv.args[0].as_runtime() {
                    Some(RuntimeValue::Issue(issue)) => *issue,
                    _ => unreachable!("checked by dispatch"),
                };
                let args = inv.args.get(1).map(|hash| {
                    hash.as_hash()
                        .expect("checked by dispatch")
                        .iter()
                        .map(|(k, v)| (k.to_string(), make_issue_arg_match(v)))
                        .collect()
                });
                Ok(Value::Runtime(RuntimeValue::Matcher(Rc::new(Matcher::Issue {
                    issue,
                    args,
                }))))
            },
        )
        .register(registry);

    // Level expectations.

    for (name, level) in [
        ("PSpec::Notice", LogLevel::Notice),
        ("PSpec::Warning", LogLevel::Warning),
        ("PSpec::Error", LogLevel::Err),
    ] {
        FunctionBuilder::new(name)
            .dispatch(vec![rep(expectations_type())], move |inv| {
                let levels = make_level_expectations(name, level, &inv.args)?;
                Ok(Value::Runtime(RuntimeValue::Expectation(Rc::new(Expectation {
                    levels,
                }))))
            })
            .register(registry);
    }

    // Results.

    FunctionBuilder::new("PSpec::Parses_to")
        .dispatch(vec![req(TypeSpec::string())], |inv| {
            Ok(wrap_result(SpecResult::Parse {
                expected: inv.args[0].as_str().expect("checked by dispatch").to_string(),
                location: inv.location.clone(),
            }))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Evaluates_to")
        .dispatch(vec![req(TypeSpec::Any)], |inv| {
            Ok(wrap_result(SpecResult::Evaluation { expected: inv.args[0].clone() }))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Evaluates_ok")
        .dispatch(vec![], |_| {
            Ok(wrap_result(SpecResult::EvaluatesWith {
                expectations: vec![Expectation::expect_ok()],
            }))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Validates_ok")
        .dispatch(vec![], |_| {
            Ok(wrap_result(SpecResult::ValidatesWith {
                expectations: vec![Expectation::expect_ok()],
            }))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Evaluates_with")
        .dispatch(
            vec![rep(TypeSpec::variant(vec![
                TypeSpec::runtime(RuntimeKind::Expectation),
                expectations_type(),
            ]))],
            |inv| {
                let expectations = expectation_results("PSpec::Evaluates_with", inv)?;
                Ok(wrap_result(SpecResult::EvaluatesWith { expectations }))
            },
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Validates_with")
        .dispatch(
            vec![rep(TypeSpec::variant(vec![
                TypeSpec::runtime(RuntimeKind::Expectation),
                expectations_type(),
            ]))],
            |inv| {
                let expectations = expectation_results("PSpec::Validates_with", inv)?;
                Ok(wrap_result(SpecResult::ValidatesWith { expectations }))
            },
        )
        .register(registry);

    // Lazy values.

    FunctionBuilder::new("PSpec::Let")
        .dispatch(
            vec![req(TypeSpec::non_empty_string()), req(TypeSpec::Any)],
            |inv| {
                let name = inv.args[0].as_str().expect("checked by dispatch").to_string();
                let value = to_lazy(&inv.args[1]);
                Ok(Value::Runtime(RuntimeValue::Let(Rc::new(LazyValueLet { name, value }))))
            },
        )
        .register(registry);

    FunctionBuilder::new("PSpec::Get")
        .dispatch(vec![req(TypeSpec::non_empty_string())], |inv| {
            let name = inv.args[0].as_str().expect("checked by dispatch").to_string();
            Ok(wrap_lazy(LazyKind::Get(name)))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Directory")
        .dispatch(vec![req(TypeSpec::Any)], |inv| {
            Ok(wrap_lazy(LazyKind::Directory(inv.args[0].clone())))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::File")
        .dispatch(vec![req(TypeSpec::Any)], |inv| {
            Ok(wrap_lazy(LazyKind::File(inv.args[0].clone())))
        })
        .register(registry);

    FunctionBuilder::new("PSpec::Format")
        .dispatch(vec![req(TypeSpec::Any), rep(TypeSpec::Any)], |inv| {
            Ok(wrap_lazy(LazyKind::Format {
                format: inv.args[0].clone(),
                args: inv.args[1..].to_vec(),
            }))
        })
        .register(registry);
}

fn fragments_of(args: &[Value], epp: bool) -> Vec<Fragment> {
    args.iter()
        .map(|arg| match arg {
            Value::String(code) => Fragment { epp, body: FragmentBody::Literal(code.clone()) },
            Value::Runtime(RuntimeValue::Lazy(lazy)) => {
                Fragment { epp, body: FragmentBody::Lazy(lazy.clone()) }
            }
            _ => unreachable!("checked by dispatch"),
        })
        .collect()
}

fn all_matchers(name: &str, args: &[Value]) -> Result<Vec<Rc<Matcher>>, Reported> {
    args.iter()
        .enumerate()
        .map(|(index, arg)| make_matcher(name, index, arg))
        .collect()
}

fn require_flag(key: &str, value: &Value) -> Result<bool, Reported> {
    value.as_bool().ok_or_else(|| {
        illegal_argument(
            "PSpec::Parser_options",
            0,
            &format!("Boolean for '{}'", key),
            value,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::issue::Location;
    use crate::lang::logger::StdLogger;
    use crate::lang::value::RegexValue;

    fn registry() -> FunctionRegistry {
        let mut reg = FunctionRegistry::new();
        register_constructors(&mut reg);
        reg
    }

    fn call(reg: &FunctionRegistry, name: &str, args: Vec<Value>) -> Result<Value, Reported> {
        reg.call(name, args, Location::default(), &StdLogger)
    }

    fn evaluates_ok(reg: &FunctionRegistry) -> Value {
        call(reg, "PSpec::Evaluates_ok", vec![]).unwrap()
    }

    #[test]
    fn example_requires_a_result() {
        let reg = registry();
        let err = call(&reg, "PSpec::Example", vec![Value::from("empty")]).unwrap_err();
        assert_eq!(err.code(), "EVAL_ILLEGAL_ARGUMENT_COUNT");
    }

    #[test]
    fn example_takes_the_first_given() {
        let reg = registry();
        let g1 = call(&reg, "PSpec::Given", vec![Value::from("1")]).unwrap();
        let g2 = call(&reg, "PSpec::Given", vec![Value::from("2")]).unwrap();
        let node = call(
            &reg,
            "PSpec::Example",
            vec![Value::from("e"), g1.clone(), g2, evaluates_ok(&reg)],
        )
        .unwrap();
        let node = match node.as_runtime() {
            Some(RuntimeValue::Node(n)) => n.clone(),
            other => panic!("expected node, got {:?}", other),
        };
        let given = node.given().unwrap();
        assert_eq!(given.inputs.len(), 1);
        match g1.as_runtime() {
            Some(RuntimeValue::Given(g)) => assert!(Rc::ptr_eq(given, g)),
            _ => panic!("expected a Given"),
        }
    }

    #[test]
    fn scope_keys_are_pattern_checked() {
        let reg = registry();
        let bad = Value::Hash(vec![(Value::from("Bad"), Value::from(1i64))]);
        let err = call(&reg, "PSpec::Scope", vec![bad]).unwrap_err();
        assert_eq!(err.code(), "EVAL_ILLEGAL_ARGUMENT_TYPE");
        let good = Value::Hash(vec![(Value::from("ok_name"), Value::from(1i64))]);
        assert!(call(&reg, "PSpec::Scope", vec![good]).is_ok());
    }

    #[test]
    fn let_requires_a_non_empty_name() {
        let reg = registry();
        let err = call(&reg, "PSpec::Let", vec![Value::from(""), Value::from(1i64)]).unwrap_err();
        assert_eq!(err.code(), "EVAL_ILLEGAL_ARGUMENT_TYPE");
        assert!(err.to_string().contains("String[1]"));
    }

    #[test]
    fn examples_flattens_nested_node_arrays() {
        let reg = registry();
        let child = call(
            &reg,
            "PSpec::Example",
            vec![Value::from("leaf"), evaluates_ok(&reg)],
        )
        .unwrap();
        let group = call(
            &reg,
            "PSpec::Examples",
            vec![Value::from("g"), Value::Array(vec![Value::Array(vec![child])])],
        )
        .unwrap();
        match group.as_runtime() {
            Some(RuntimeValue::Node(Node::Group(g))) => {
                let test = Node::Group(g.clone()).create_test();
                match test {
                    crate::context::Test::Group(tg) => assert_eq!(tg.tests.len(), 1),
                    _ => panic!("expected a group"),
                }
            }
            other => panic!("expected group node, got {:?}", other),
        }
    }

    #[test]
    fn parser_options_reject_non_boolean_flags() {
        let reg = registry();
        let bad = Value::Hash(vec![(Value::from("tasks"), Value::from("yes"))]);
        let err = call(&reg, "PSpec::Parser_options", vec![bad]).unwrap_err();
        assert_eq!(err.code(), "EVAL_ILLEGAL_ARGUMENT_TYPE");
    }

    #[test]
    fn evaluates_with_accepts_bare_matchers_as_error_level() {
        let reg = registry();
        let result = call(
            &reg,
            "PSpec::Evaluates_with",
            vec![Value::Regexp(RegexValue::new("boom").unwrap())],
        )
        .unwrap();
        match result.as_runtime() {
            Some(RuntimeValue::Result(r)) => match r.as_ref() {
                SpecResult::EvaluatesWith { expectations } => {
                    assert_eq!(expectations.len(), 1);
                    assert_eq!(expectations[0].levels[0].level, LogLevel::Err);
                }
                other => panic!("expected EvaluatesWith, got {:?}", other),
            },
            other => panic!("expected result, got {:?}", other),
        }
    }
}
