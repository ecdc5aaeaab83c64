//! String utilities shared by the engine and the harness: the engine's
//! sprintf-style formatter, quoting, and indentation stripping.

use crate::issue_args;
use crate::lang::issue::{Reported, EVAL_FAILURE};
use crate::lang::value::Value;

/// Formats `format` with the engine's directive set: `%s` (string form),
/// `%p` (quoted form), `%d`, `%f`, `%x`, and `%%`.
pub fn sprintf(format: &str, args: &[Value]) -> Result<String, Reported> {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => out.push_str(&take(args, format, &mut next_arg)?.to_string()),
            Some('p') => out.push_str(&quoted_form(take(args, format, &mut next_arg)?)),
            Some('d') => match take(args, format, &mut next_arg)? {
                Value::Integer(n) => out.push_str(&n.to_string()),
                Value::Float(n) => out.push_str(&(*n as i64).to_string()),
                other => return Err(directive_error('d', other)),
            },
            Some('f') => match take(args, format, &mut next_arg)? {
                Value::Integer(n) => out.push_str(&format!("{:.6}", *n as f64)),
                Value::Float(n) => out.push_str(&format!("{:.6}", n)),
                other => return Err(directive_error('f', other)),
            },
            Some('x') => match take(args, format, &mut next_arg)? {
                Value::Integer(n) => out.push_str(&format!("{:x}", n)),
                other => return Err(directive_error('x', other)),
            },
            Some(other) => {
                return Err(Reported::error(
                    &EVAL_FAILURE,
                    issue_args! { "message" => format!("sprintf: unsupported directive '%{}'", other) },
                    None,
                ))
            }
            None => {
                return Err(Reported::error(
                    &EVAL_FAILURE,
                    issue_args! { "message" => "sprintf: trailing '%' in format" },
                    None,
                ))
            }
        }
    }
    Ok(out)
}

fn take<'a>(args: &'a [Value], format: &str, next_arg: &mut usize) -> Result<&'a Value, Reported> {
    let arg = args.get(*next_arg).ok_or_else(|| {
        Reported::error(
            &EVAL_FAILURE,
            issue_args! { "message" => format!("sprintf: too few arguments for format '{}'", format) },
            None,
        )
    })?;
    *next_arg += 1;
    Ok(arg)
}

fn directive_error(directive: char, value: &Value) -> Reported {
    Reported::error(
        &EVAL_FAILURE,
        issue_args! {
            "message" => format!(
                "sprintf: '%{}' is not applicable to a {}",
                directive,
                value.type_name()
            )
        },
        None,
    )
}

fn quoted_form(value: &Value) -> String {
    match value {
        Value::String(s) => quote(s),
        other => other.to_string(),
    }
}

/// Single-quotes a string the way the engine renders string literals,
/// escaping quotes and backslashes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Strips a leading newline and the common indentation of all non-empty
/// lines. Used by `Unindent` so spec files can nest source snippets.
pub fn unindent(s: &str) -> String {
    let body = s.strip_prefix('\n').unwrap_or(s);
    let indent = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = String::with_capacity(body.len());
    for (i, line) in body.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if line.len() >= indent {
            out.push_str(&line[indent..]);
        } else {
            out.push_str(line.trim_start());
        }
    }
    if body.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprintf_basics() {
        let out = sprintf(
            "hello %s, %d%%, %p",
            &[Value::from("world"), Value::from(42i64), Value::from("q")],
        )
        .unwrap();
        assert_eq!(out, "hello world, 42%, 'q'");
    }

    #[test]
    fn sprintf_rejects_bad_directive() {
        let err = sprintf("%z", &[Value::Undef]).unwrap_err();
        assert!(err.to_string().contains("unsupported directive"));
    }

    #[test]
    fn sprintf_rejects_missing_argument() {
        assert!(sprintf("%s %s", &[Value::from("one")]).is_err());
    }

    #[test]
    fn unindent_strips_common_margin() {
        let src = "\n      $x = 1\n      notice($x)\n";
        assert_eq!(unindent(src), "$x = 1\nnotice($x)\n");
    }

    #[test]
    fn unindent_keeps_relative_indent() {
        let src = "\n  a\n    b\n";
        assert_eq!(unindent(src), "a\n  b\n");
    }
}
