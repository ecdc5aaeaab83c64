//! Issues originated by the harness itself.

use crate::lang::issue::{lang_issue_for_code, IssueDef};

pub static PSPEC_GET_OF_UNKNOWN_VARIABLE: IssueDef = IssueDef {
    code: "PSPEC_GET_OF_UNKNOWN_VARIABLE",
    template: "Get of unknown variable named '%{name}'",
};

pub static PSPEC_INVALID_FILE_CONTENT: IssueDef = IssueDef {
    code: "PSPEC_INVALID_FILE_CONTENT",
    template: "cannot create file content from a value of type %{type}",
};

pub static PSPEC_VALUE_NOT_HASH: IssueDef = IssueDef {
    code: "PSPEC_VALUE_NOT_HASH",
    template: "%{type} does not contain a Hash",
};

pub static PSPEC_FORMAT_NOT_STRING: IssueDef = IssueDef {
    code: "PSPEC_FORMAT_NOT_STRING",
    template: "Format requires its first argument to resolve to a String, got %{type}",
};

pub static PSPEC_PN_PARSE_ERROR: IssueDef = IssueDef {
    code: "PSPEC_PN_PARSE_ERROR",
    template: "PN parse error: %{detail}",
};

static PSPEC_ISSUES: &[&IssueDef] = &[
    &PSPEC_GET_OF_UNKNOWN_VARIABLE,
    &PSPEC_INVALID_FILE_CONTENT,
    &PSPEC_VALUE_NOT_HASH,
    &PSPEC_FORMAT_NOT_STRING,
    &PSPEC_PN_PARSE_ERROR,
];

/// Resolves a code against the harness issues and the engine issues. This
/// is what turns a bare reference like `EVAL_UNKNOWN_VARIABLE` in a spec
/// file into an issue descriptor.
pub fn issue_for_code(code: &str) -> Option<&'static IssueDef> {
    PSPEC_ISSUES
        .iter()
        .copied()
        .find(|i| i.code == code)
        .or_else(|| lang_issue_for_code(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_both_tables() {
        assert!(issue_for_code("PSPEC_VALUE_NOT_HASH").is_some());
        assert!(issue_for_code("EVAL_UNKNOWN_VARIABLE").is_some());
        assert!(issue_for_code("BOGUS").is_none());
    }
}
