//! Process-wide engine settings.
//!
//! The store mirrors the engine's global configuration: the harness resets
//! it at the start of every test executable, and `Settings` inputs write
//! into it before the example body runs. Values are flattened into a
//! thread-safe mirror so the store itself can be shared.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::lang::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Setting {
    Undef,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Setting>),
    Hash(Vec<(String, Setting)>),
}

static STORE: Lazy<Mutex<HashMap<String, Setting>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Serialises tests that mutate the process-wide store.
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

fn store() -> std::sync::MutexGuard<'static, HashMap<String, Setting>> {
    STORE.lock().unwrap_or_else(|e| e.into_inner())
}

fn flatten(value: &Value) -> Setting {
    match value {
        Value::Undef => Setting::Undef,
        Value::Boolean(b) => Setting::Boolean(*b),
        Value::Integer(n) => Setting::Integer(*n),
        Value::Float(n) => Setting::Float(*n),
        Value::String(s) => Setting::String(s.clone()),
        Value::Array(items) => Setting::Array(items.iter().map(flatten).collect()),
        Value::Hash(entries) => Setting::Hash(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), flatten(v)))
                .collect(),
        ),
        other => Setting::String(other.to_string()),
    }
}

fn inflate(setting: &Setting) -> Value {
    match setting {
        Setting::Undef => Value::Undef,
        Setting::Boolean(b) => Value::Boolean(*b),
        Setting::Integer(n) => Value::Integer(*n),
        Setting::Float(n) => Value::Float(*n),
        Setting::String(s) => Value::String(s.clone()),
        Setting::Array(items) => Value::Array(items.iter().map(inflate).collect()),
        Setting::Hash(entries) => Value::Hash(
            entries
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), inflate(v)))
                .collect(),
        ),
    }
}

/// Clears every setting. Run before each test executable.
pub fn reset() {
    store().clear();
}

pub fn set(key: &str, value: &Value) {
    store().insert(key.to_string(), flatten(value));
}

pub fn get(key: &str) -> Option<Value> {
    store().get(key).map(inflate)
}

/// Boolean settings default to false when unset or non-boolean.
pub fn get_bool(key: &str) -> bool {
    matches!(store().get(key), Some(Setting::Boolean(true)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_reset_round_trip() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        reset();
        set("strict_variables", &Value::Boolean(true));
        assert!(get_bool("strict_variables"));
        assert!(get("strict_variables").unwrap().equals(&Value::Boolean(true)));
        reset();
        assert!(!get_bool("strict_variables"));
        assert!(get("strict_variables").is_none());
    }
}
