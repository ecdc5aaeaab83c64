//! Function registry with typed dispatch.
//!
//! Registered functions declare their parameters in a small type grammar
//! (`Any`, `Data`, `String[n]`, `Pattern[/…/]`, `Hash[K,V]`, `Variant[…]`,
//! runtime kinds). Arguments are checked before a handler runs; a mismatch
//! raises the engine's illegal-argument issue, which is what fails a spec
//! file's construction phase on a badly typed constructor call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::issue_args;
use crate::lang::issue::{
    Location, Reported, EVAL_ILLEGAL_ARGUMENT_COUNT, EVAL_ILLEGAL_ARGUMENT_TYPE,
    EVAL_UNKNOWN_FUNCTION,
};
use crate::lang::logger::Logger;
use crate::lang::value::{RuntimeValue, Value};

/// The runtime kinds a parameter can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Node,
    Given,
    Input,
    Result,
    Lazy,
    Let,
    Matcher,
    Include,
    Exclude,
    Expectation,
    Issue,
}

impl RuntimeKind {
    fn name(&self) -> &'static str {
        match self {
            RuntimeKind::Node => "Node",
            RuntimeKind::Given => "Given",
            RuntimeKind::Input => "Input",
            RuntimeKind::Result => "Result",
            RuntimeKind::Lazy => "LazyValue",
            RuntimeKind::Let => "Let",
            RuntimeKind::Matcher => "Match",
            RuntimeKind::Include => "Include",
            RuntimeKind::Exclude => "Exclude",
            RuntimeKind::Expectation => "Expectation",
            RuntimeKind::Issue => "Issue",
        }
    }

    fn matches(&self, value: &RuntimeValue) -> bool {
        matches!(
            (self, value),
            (RuntimeKind::Node, RuntimeValue::Node(_))
                | (RuntimeKind::Given, RuntimeValue::Given(_))
                | (RuntimeKind::Input, RuntimeValue::Input(_))
                | (RuntimeKind::Result, RuntimeValue::Result(_))
                | (RuntimeKind::Lazy, RuntimeValue::Lazy(_))
                | (RuntimeKind::Let, RuntimeValue::Let(_))
                | (RuntimeKind::Matcher, RuntimeValue::Matcher(_))
                | (RuntimeKind::Include, RuntimeValue::Include(_))
                | (RuntimeKind::Exclude, RuntimeValue::Exclude(_))
                | (RuntimeKind::Expectation, RuntimeValue::Expectation(_))
                | (RuntimeKind::Issue, RuntimeValue::Issue(_))
        )
    }
}

#[derive(Debug, Clone)]
pub enum TypeSpec {
    Any,
    Data,
    String { min: usize },
    Regexp,
    Pattern(Arc<Regex>),
    Hash {
        key: Box<TypeSpec>,
        value: Box<TypeSpec>,
    },
    ArrayOf(Box<TypeSpec>),
    Variant(Vec<TypeSpec>),
    Runtime(RuntimeKind),
}

impl TypeSpec {
    pub fn string() -> TypeSpec {
        TypeSpec::String { min: 0 }
    }

    pub fn non_empty_string() -> TypeSpec {
        TypeSpec::String { min: 1 }
    }

    pub fn pattern(pattern: &str) -> TypeSpec {
        TypeSpec::Pattern(Arc::new(
            Regex::new(pattern).expect("parameter patterns are static and valid"),
        ))
    }

    pub fn hash_of(key: TypeSpec, value: TypeSpec) -> TypeSpec {
        TypeSpec::Hash { key: Box::new(key), value: Box::new(value) }
    }

    pub fn array_of(element: TypeSpec) -> TypeSpec {
        TypeSpec::ArrayOf(Box::new(element))
    }

    pub fn variant(options: Vec<TypeSpec>) -> TypeSpec {
        TypeSpec::Variant(options)
    }

    pub fn runtime(kind: RuntimeKind) -> TypeSpec {
        TypeSpec::Runtime(kind)
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            TypeSpec::Any => true,
            TypeSpec::Data => is_data(value),
            TypeSpec::String { min } => match value {
                Value::String(s) => s.chars().count() >= *min,
                _ => false,
            },
            TypeSpec::Regexp => matches!(value, Value::Regexp(_)),
            TypeSpec::Pattern(re) => match value {
                Value::String(s) => re.is_match(s),
                _ => false,
            },
            TypeSpec::Hash { key, value: val } => match value {
                Value::Hash(entries) => entries
                    .iter()
                    .all(|(k, v)| key.matches(k) && val.matches(v)),
                _ => false,
            },
            TypeSpec::ArrayOf(element) => match value {
                Value::Array(items) => items.iter().all(|v| element.matches(v)),
                _ => false,
            },
            TypeSpec::Variant(options) => options.iter().any(|t| t.matches(value)),
            TypeSpec::Runtime(kind) => match value {
                Value::Runtime(r) => kind.matches(r),
                _ => false,
            },
        }
    }
}

fn is_data(value: &Value) -> bool {
    match value {
        Value::Undef
        | Value::Boolean(_)
        | Value::Integer(_)
        | Value::Float(_)
        | Value::String(_) => true,
        Value::Array(items) => items.iter().all(is_data),
        Value::Hash(entries) => entries.iter().all(|(k, v)| is_data(k) && is_data(v)),
        _ => false,
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => f.write_str("Any"),
            TypeSpec::Data => f.write_str("Data"),
            TypeSpec::String { min: 0 } => f.write_str("String"),
            TypeSpec::String { min } => write!(f, "String[{}]", min),
            TypeSpec::Regexp => f.write_str("Regexp"),
            TypeSpec::Pattern(re) => write!(f, "Pattern[/{}/]", re.as_str()),
            TypeSpec::Hash { key, value } => write!(f, "Hash[{}, {}]", key, value),
            TypeSpec::ArrayOf(element) => write!(f, "Array[{}]", element),
            TypeSpec::Variant(options) => {
                f.write_str("Variant[")?;
                for (i, t) in options.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str("]")
            }
            TypeSpec::Runtime(kind) => f.write_str(kind.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    Required,
    Optional,
    Repeated,
}

#[derive(Clone)]
pub struct Param {
    pub spec: TypeSpec,
    pub style: ParamStyle,
}

/// A required parameter.
pub fn req(spec: TypeSpec) -> Param {
    Param { spec, style: ParamStyle::Required }
}

/// An optional trailing parameter.
pub fn opt(spec: TypeSpec) -> Param {
    Param { spec, style: ParamStyle::Optional }
}

/// A repeated trailing parameter (zero or more).
pub fn rep(spec: TypeSpec) -> Param {
    Param { spec, style: ParamStyle::Repeated }
}

/// What a handler gets to see: evaluated arguments, the call location, and
/// the active log sink.
pub struct Invocation<'a> {
    pub args: Vec<Value>,
    pub location: Location,
    pub logger: &'a dyn Logger,
}

pub type HandlerFn = Arc<dyn Fn(&Invocation) -> Result<Value, Reported> + Send + Sync>;

pub struct Dispatch {
    params: Vec<Param>,
    handler: HandlerFn,
}

impl Dispatch {
    fn arity(&self) -> (usize, Option<usize>) {
        let required = self
            .params
            .iter()
            .filter(|p| p.style == ParamStyle::Required)
            .count();
        let repeated = self.params.iter().any(|p| p.style == ParamStyle::Repeated);
        if repeated {
            (required, None)
        } else {
            (required, Some(self.params.len()))
        }
    }

    fn accepts_count(&self, argc: usize) -> bool {
        let (min, max) = self.arity();
        argc >= min && max.map_or(true, |m| argc <= m)
    }

    /// The parameter governing the argument at `idx`; past the end, the
    /// trailing repeated parameter if there is one.
    fn param_for(&self, idx: usize) -> Option<&Param> {
        self.params.get(idx).or_else(|| {
            self.params
                .last()
                .filter(|p| p.style == ParamStyle::Repeated)
        })
    }

    /// Index and expected type of the first mismatching argument, if any.
    fn first_mismatch(&self, args: &[Value]) -> Option<(usize, TypeSpec)> {
        for (idx, arg) in args.iter().enumerate() {
            let param = self.param_for(idx)?;
            if !param.spec.matches(arg) {
                return Some((idx, param.spec.clone()));
            }
        }
        None
    }

    fn matches(&self, args: &[Value]) -> bool {
        self.accepts_count(args.len()) && self.first_mismatch(args).is_none()
    }
}

pub struct DslFunction {
    name: String,
    dispatches: Vec<Dispatch>,
}

/// Builder mirroring how constructors declare their dispatches.
pub struct FunctionBuilder {
    function: DslFunction,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        FunctionBuilder {
            function: DslFunction { name: name.to_string(), dispatches: Vec::new() },
        }
    }

    pub fn dispatch(
        mut self,
        params: Vec<Param>,
        handler: impl Fn(&Invocation) -> Result<Value, Reported> + Send + Sync + 'static,
    ) -> Self {
        self.function
            .dispatches
            .push(Dispatch { params, handler: Arc::new(handler) });
        self
    }

    pub fn register(self, registry: &mut FunctionRegistry) {
        registry.insert(self.function);
    }
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    funcs: HashMap<String, Arc<DslFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry::default()
    }

    fn insert(&mut self, function: DslFunction) {
        self.funcs.insert(function.name.clone(), Arc::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        location: Location,
        logger: &dyn Logger,
    ) -> Result<Value, Reported> {
        let function = self.funcs.get(name).ok_or_else(|| {
            Reported::error(
                &EVAL_UNKNOWN_FUNCTION,
                issue_args! { "name" => name },
                Some(location.clone()),
            )
        })?;
        for dispatch in &function.dispatches {
            if dispatch.matches(&args) {
                let invocation = Invocation { args, location, logger };
                return (dispatch.handler)(&invocation);
            }
        }
        Err(self.mismatch_error(function, &args, location))
    }

    fn mismatch_error(
        &self,
        function: &DslFunction,
        args: &[Value],
        location: Location,
    ) -> Reported {
        // Report against the first dispatch whose arity fits, else complain
        // about the count.
        for dispatch in &function.dispatches {
            if dispatch.accepts_count(args.len()) {
                if let Some((idx, expected)) = dispatch.first_mismatch(args) {
                    return Reported::error(
                        &EVAL_ILLEGAL_ARGUMENT_TYPE,
                        issue_args! {
                            "function" => function.name.as_str(),
                            "index" => idx,
                            "expected" => expected.to_string(),
                            "actual" => args[idx].type_name(),
                        },
                        Some(location),
                    );
                }
            }
        }
        let (min, _) = function
            .dispatches
            .first()
            .map(|d| d.arity())
            .unwrap_or((0, Some(0)));
        Reported::error(
            &EVAL_ILLEGAL_ARGUMENT_COUNT,
            issue_args! {
                "function" => function.name.as_str(),
                "expected" => format!("at least {}", min),
                "actual" => args.len(),
            },
            Some(location),
        )
    }
}
