//! The engine's value system.
//!
//! Hashes preserve insertion order, which matters for fixture trees and for
//! stable rendering; equality between hashes is order-insensitive.

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::expectation::{Exclude, Expectation, Include, Matcher};
use crate::lang::issue::IssueDef;
use crate::lazy::{LazyValue, LazyValueLet};
use crate::node::{Given, Input, Node, SpecResult};

/// A compiled regex literal. Equality is by pattern text.
#[derive(Debug, Clone)]
pub struct RegexValue {
    pattern: String,
    regex: Rc<Regex>,
}

impl RegexValue {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(RegexValue {
            pattern: pattern.to_string(),
            regex: Rc::new(Regex::new(pattern)?),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undef,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Regexp(RegexValue),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Hash(Vec<(Value, Value)>),
    Runtime(RuntimeValue),
}

/// Host objects surfaced into the language as opaque values. The variant
/// set is closed; the harness is the only producer.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Node(Node),
    Given(Rc<Given>),
    Input(Rc<Input>),
    Result(Rc<SpecResult>),
    Lazy(Rc<LazyValue>),
    Let(Rc<LazyValueLet>),
    Matcher(Rc<Matcher>),
    Include(Rc<Include>),
    Exclude(Rc<Exclude>),
    Expectation(Rc<Expectation>),
    Issue(&'static IssueDef),
}

impl RuntimeValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuntimeValue::Node(_) => "Node",
            RuntimeValue::Given(_) => "Given",
            RuntimeValue::Input(_) => "Input",
            RuntimeValue::Result(_) => "Result",
            RuntimeValue::Lazy(_) => "LazyValue",
            RuntimeValue::Let(_) => "Let",
            RuntimeValue::Matcher(_) => "Match",
            RuntimeValue::Include(_) => "Include",
            RuntimeValue::Exclude(_) => "Exclude",
            RuntimeValue::Expectation(_) => "Expectation",
            RuntimeValue::Issue(_) => "Issue",
        }
    }

    fn equals(&self, other: &RuntimeValue) -> bool {
        match (self, other) {
            (RuntimeValue::Node(a), RuntimeValue::Node(b)) => a.ptr_eq(b),
            (RuntimeValue::Given(a), RuntimeValue::Given(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Input(a), RuntimeValue::Input(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Result(a), RuntimeValue::Result(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Lazy(a), RuntimeValue::Lazy(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Let(a), RuntimeValue::Let(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Matcher(a), RuntimeValue::Matcher(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Include(a), RuntimeValue::Include(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Exclude(a), RuntimeValue::Exclude(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Expectation(a), RuntimeValue::Expectation(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Issue(a), RuntimeValue::Issue(b)) => a.code == b.code,
            _ => false,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undef => "Undef",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Regexp(_) => "Regexp",
            Value::Binary(_) => "Binary",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Runtime(r) => r.kind_name(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Hash(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_runtime(&self) -> Option<&RuntimeValue> {
        match self {
            Value::Runtime(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    /// Deep equality. Integers and floats compare across the numeric types;
    /// hash comparison ignores entry order.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undef, Value::Undef) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Regexp(a), Value::Regexp(b)) => a.pattern == b.pattern,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Hash(a), Value::Hash(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(bk, bv)| k.equals(bk) && v.equals(bv))
                    })
            }
            (Value::Runtime(a), Value::Runtime(b)) => a.equals(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undef => f.write_str("undef"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => f.write_str(s),
            Value::Regexp(r) => write!(f, "/{}/", r.pattern),
            Value::Binary(bytes) => {
                f.write_str("Binary(")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                f.write_str(")")
            }
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Hash(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} => {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Runtime(r) => write!(f, "{}(...)", r.kind_name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Integer(n as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_equality() {
        assert!(Value::Integer(3).equals(&Value::Float(3.0)));
        assert!(!Value::Integer(3).equals(&Value::Float(3.5)));
    }

    #[test]
    fn hash_equality_ignores_order() {
        let a = Value::Hash(vec![
            (Value::from("a"), Value::from(1i64)),
            (Value::from("b"), Value::from(2i64)),
        ]);
        let b = Value::Hash(vec![
            (Value::from("b"), Value::from(2i64)),
            (Value::from("a"), Value::from(1i64)),
        ]);
        assert!(a.equals(&b));
    }

    #[test]
    fn display_is_engine_flavored() {
        let v = Value::Array(vec![Value::from(1i64), Value::from("x"), Value::Undef]);
        assert_eq!(v.to_string(), "[1, x, undef]");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
    }
}
