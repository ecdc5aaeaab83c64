//! Deferred values.
//!
//! A `Let` binds a name to a lazy value; reads realise the value on first
//! access and memoise it per TestContext. `Directory` and `File` values
//! materialise temp fixtures and register their removal as tear-downs on
//! the context that realised them.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::TestContext;
use crate::issue_args;
use crate::issues::{PSPEC_FORMAT_NOT_STRING, PSPEC_INVALID_FILE_CONTENT, PSPEC_VALUE_NOT_HASH};
use crate::lang::format;
use crate::lang::issue::{Reported, EVAL_FAILURE};
use crate::lang::value::Value;

// Atomic so concurrently constructed spec files mint non-colliding ids.
static NEXT_LAZY_ID: AtomicU64 = AtomicU64::new(0);

/// A named lazy binding introduced by `Let`.
#[derive(Debug)]
pub struct LazyValueLet {
    pub name: String,
    pub value: std::rc::Rc<LazyValue>,
}

#[derive(Debug)]
pub enum LazyKind {
    /// A value that may contain nested lazy values.
    Generic(Value),
    /// A hash describing a directory tree to materialise.
    Directory(Value),
    /// File content to materialise.
    File(Value),
    /// sprintf-style formatting, applied after resolving every part.
    Format { format: Value, args: Vec<Value> },
    /// Late-bound read of a `Let` by name.
    Get(String),
}

#[derive(Debug)]
pub struct LazyValue {
    id: u64,
    pub kind: LazyKind,
}

impl LazyValue {
    pub fn new(kind: LazyKind) -> std::rc::Rc<Self> {
        std::rc::Rc::new(LazyValue {
            id: NEXT_LAZY_ID.fetch_add(1, Ordering::Relaxed),
            kind,
        })
    }

    pub fn generic(content: Value) -> std::rc::Rc<Self> {
        LazyValue::new(LazyKind::Generic(content))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Computes the value against `tc`. Memoisation lives in
    /// [`TestContext::realize`]; this always recomputes.
    pub fn get(&self, tc: &TestContext) -> Result<Value, Reported> {
        match &self.kind {
            LazyKind::Generic(content) => tc.resolve_lazy(content),

            LazyKind::Directory(content) => {
                let resolved = tc.resolve_lazy(content)?;
                let entries = match resolved.as_hash() {
                    Some(entries) => entries,
                    None => {
                        return Err(Reported::error(
                            &PSPEC_VALUE_NOT_HASH,
                            issue_args! { "type" => "Directory" },
                            None,
                        ))
                    }
                };
                let dir = tempfile::Builder::new()
                    .prefix("pspec")
                    .tempdir()
                    .map_err(io_error)?
                    .into_path();
                make_directories(&dir, entries)?;
                let removed = dir.clone();
                tc.register_tear_down(Box::new(move || {
                    let _ = fs::remove_dir_all(&removed);
                }));
                Ok(Value::String(dir.display().to_string()))
            }

            LazyKind::File(content) => {
                let resolved = tc.resolve_lazy(content)?;
                let file = tempfile::Builder::new()
                    .prefix("pspec")
                    .tempfile()
                    .map_err(io_error)?;
                let (_, path) = file.keep().map_err(|e| io_error(e.error))?;
                write_file_value(&path, &resolved)?;
                let removed = path.clone();
                tc.register_tear_down(Box::new(move || {
                    let _ = fs::remove_file(&removed);
                }));
                Ok(Value::String(path.display().to_string()))
            }

            LazyKind::Format { format: fmt, args } => {
                let resolved = tc.resolve_lazy(fmt)?;
                let fmt = match resolved.as_str() {
                    Some(s) => s.to_string(),
                    None => {
                        return Err(Reported::error(
                            &PSPEC_FORMAT_NOT_STRING,
                            issue_args! { "type" => resolved.type_name() },
                            None,
                        ))
                    }
                };
                let mut resolved_args = Vec::with_capacity(args.len());
                for arg in args {
                    resolved_args.push(tc.resolve_lazy(arg)?);
                }
                format::sprintf(&fmt, &resolved_args).map(Value::String)
            }

            LazyKind::Get(name) => {
                let target = tc.get_lazy(name)?;
                tc.realize(&target)
            }
        }
    }
}

fn make_directories(parent: &Path, entries: &[(Value, Value)]) -> Result<(), Reported> {
    for (key, value) in entries {
        let path = parent.join(key.to_string());
        match value {
            Value::Hash(children) => {
                fs::create_dir(&path).map_err(io_error)?;
                make_directories(&path, children)?;
            }
            other => write_file_value(&path, other)?,
        }
    }
    Ok(())
}

fn write_file_value(path: &Path, value: &Value) -> Result<(), Reported> {
    match value {
        Value::String(s) => fs::write(path, s.as_bytes()).map_err(io_error),
        Value::Binary(bytes) => fs::write(path, bytes).map_err(io_error),
        other => Err(Reported::error(
            &PSPEC_INVALID_FILE_CONTENT,
            issue_args! { "type" => other.type_name() },
            None,
        )),
    }
}

fn io_error(e: std::io::Error) -> Reported {
    Reported::error(&EVAL_FAILURE, issue_args! { "message" => e.to_string() }, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = LazyValue::generic(Value::Undef);
        let b = LazyValue::generic(Value::Undef);
        assert!(b.id() > a.id());
    }
}
