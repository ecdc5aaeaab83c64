//! Variable scopes.
//!
//! `Scope::get` is fallible: the harness fronts the basic scope with a
//! lazy-binding view whose lookups can themselves fail (e.g. a fixture that
//! cannot be materialised), and those failures must surface as evaluation
//! errors.

use std::collections::HashMap;

use crate::lang::issue::Reported;
use crate::lang::value::Value;

pub trait Scope {
    fn get(&self, name: &str) -> Result<Option<Value>, Reported>;
    fn set(&mut self, name: &str, value: Value);
}

#[derive(Debug, Default)]
pub struct BasicScope {
    vars: HashMap<String, Value>,
}

impl BasicScope {
    pub fn new() -> Self {
        BasicScope::default()
    }

    /// Builds a scope from hash entries; keys are taken in string form.
    pub fn from_entries(entries: &[(Value, Value)]) -> Self {
        let mut scope = BasicScope::new();
        for (k, v) in entries {
            scope.vars.insert(k.to_string(), v.clone());
        }
        scope
    }
}

impl Scope for BasicScope {
    fn get(&self, name: &str) -> Result<Option<Value>, Reported> {
        Ok(self.vars.get(name).cloned())
    }

    fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut scope = BasicScope::new();
        scope.set("x", Value::from(1i64));
        assert!(scope.get("x").unwrap().unwrap().equals(&Value::Integer(1)));
        assert!(scope.get("y").unwrap().is_none());
    }
}
