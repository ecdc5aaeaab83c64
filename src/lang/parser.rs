//! Parser for the expression language.
//!
//! Converts source text into [`Expr`] trees with source location tracking.
//! Purely syntactic; validation is a separate pass.

use std::rc::Rc;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::issue_args;
use crate::lang::ast::{
    BinaryOp, EppPart, Expr, FunctionDef, Span, StrPart, StringExpr, TaskDef, UnaryOp,
};
use crate::lang::issue::{
    Location, Reported, PARSE_ILLEGAL_BACKTICK, PARSE_ILLEGAL_TASK, PARSE_SYNTAX_ERROR,
};

#[derive(Parser)]
#[grammar = "lang/grammar.pest"]
struct LangParser;

/// Feature flags for a single parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    pub epp_mode: bool,
    pub tasks: bool,
    pub hex_escapes: bool,
    pub backtick_strings: bool,
}

impl ParserOptions {
    pub fn with_epp(mut self, epp: bool) -> Self {
        self.epp_mode = epp;
        self
    }
}

/// Parses `source` into an AST. The result is a `Program` wrapper (or an
/// `Epp` template in EPP mode); with `single_expr`, a one-statement program
/// is returned bare.
pub fn parse(
    path: &str,
    source: &str,
    single_expr: bool,
    options: ParserOptions,
) -> Result<Expr, Reported> {
    let builder = Builder { path, options };
    if options.epp_mode {
        let mut pairs = LangParser::parse(Rule::epp_program, source)
            .map_err(|e| convert_parse_error(e, path))?;
        return builder.build_epp(pairs.next().expect("epp_program is guaranteed"));
    }

    let mut pairs =
        LangParser::parse(Rule::program, source).map_err(|e| convert_parse_error(e, path))?;
    let program = pairs.next().expect("program is guaranteed");
    let span = span_of(&program);
    let mut stmts = Vec::new();
    for p in program.into_inner() {
        if p.as_rule() == Rule::EOI {
            continue;
        }
        stmts.push(builder.build(p)?);
    }
    if single_expr && stmts.len() == 1 {
        return Ok(stmts.pop().expect("length checked"));
    }
    Ok(Expr::Program(stmts, span))
}

struct Builder<'a> {
    path: &'a str,
    options: ParserOptions,
}

impl Builder<'_> {
    fn error(&self, issue: &'static crate::lang::issue::IssueDef, span: Span) -> Reported {
        Reported::error(
            issue,
            vec![],
            Some(Location::new(self.path, span.line, span.col)),
        )
    }

    fn syntax_error(&self, detail: &str, span: Span) -> Reported {
        Reported::error(
            &PARSE_SYNTAX_ERROR,
            issue_args! { "detail" => detail },
            Some(Location::new(self.path, span.line, span.col)),
        )
    }

    fn build(&self, pair: Pair<Rule>) -> Result<Expr, Reported> {
        let span = span_of(&pair);
        match pair.as_rule() {
            Rule::expression | Rule::paren => {
                self.build(pair.into_inner().next().expect("inner is guaranteed"))
            }

            Rule::assignment => {
                let mut inner = pair.into_inner();
                let lhs = self.build(inner.next().expect("lhs is guaranteed"))?;
                match inner.next() {
                    None => Ok(lhs),
                    Some(_op) => {
                        let rhs = self.build(inner.next().expect("rhs follows '='"))?;
                        Ok(Expr::Assignment(Box::new(lhs), Box::new(rhs), span))
                    }
                }
            }

            Rule::equality | Rule::additive | Rule::multiplicative => {
                let mut inner = pair.into_inner();
                let mut expr = self.build(inner.next().expect("operand is guaranteed"))?;
                while let Some(op_pair) = inner.next() {
                    let op = binary_op(op_pair.as_str());
                    let rhs = self.build(inner.next().expect("operand follows operator"))?;
                    expr = Expr::Binary(op, Box::new(expr), Box::new(rhs), span);
                }
                Ok(expr)
            }

            Rule::unary => self.build(pair.into_inner().next().expect("inner is guaranteed")),

            Rule::neg => {
                let operand =
                    self.build(pair.into_inner().next().expect("operand is guaranteed"))?;
                // Fold negated literals so `-3` parses as an integer.
                Ok(match operand {
                    Expr::Integer(n, _) => Expr::Integer(-n, span),
                    Expr::Float(n, _) => Expr::Float(-n, span),
                    other => Expr::Unary(UnaryOp::Neg, Box::new(other), span),
                })
            }

            Rule::not => {
                let operand =
                    self.build(pair.into_inner().next().expect("operand is guaranteed"))?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand), span))
            }

            Rule::integer => pair
                .as_str()
                .parse::<i64>()
                .map(|n| Expr::Integer(n, span))
                .map_err(|_| self.syntax_error("integer literal out of range", span)),

            Rule::float => pair
                .as_str()
                .parse::<f64>()
                .map(|n| Expr::Float(n, span))
                .map_err(|_| self.syntax_error("invalid float literal", span)),

            Rule::boolean => Ok(Expr::Boolean(pair.as_str() == "true", span)),

            Rule::undef => Ok(Expr::Undef(span)),

            Rule::single_string => {
                let inner = pair.into_inner().next().expect("sq_inner is guaranteed");
                Ok(Expr::Str(
                    StringExpr::Literal(unescape_single(inner.as_str())),
                    span,
                ))
            }

            Rule::double_string => self.build_double_string(pair, span),

            Rule::backtick_string => {
                if !self.options.backtick_strings {
                    return Err(self.error(&PARSE_ILLEGAL_BACKTICK, span));
                }
                let text = pair.as_str();
                let body = &text[1..text.len() - 1];
                Ok(Expr::Str(StringExpr::Literal(body.to_string()), span))
            }

            Rule::regex => {
                let inner = pair.into_inner().next().expect("regex_inner is guaranteed");
                let pattern = unescape_regex(inner.as_str());
                if let Err(e) = regex::Regex::new(&pattern) {
                    return Err(
                        self.syntax_error(&format!("invalid regular expression: {}", e), span)
                    );
                }
                Ok(Expr::Regexp(pattern, span))
            }

            Rule::array => {
                let mut items = Vec::new();
                if let Some(list) = pair.into_inner().next() {
                    for p in list.into_inner() {
                        items.push(self.build(p)?);
                    }
                }
                Ok(Expr::Array(items, span))
            }

            Rule::hash => {
                let entries = match pair.into_inner().next() {
                    Some(list) => self.build_hash_entries(list)?,
                    None => Vec::new(),
                };
                Ok(Expr::HashLiteral(entries, span))
            }

            Rule::call => {
                let mut inner = pair.into_inner();
                let name = inner.next().expect("call_name is guaranteed").as_str().to_string();
                let mut args = Vec::new();
                if let Some(list) = inner.next() {
                    for p in list.into_inner() {
                        args.push(self.build(p)?);
                    }
                }
                Ok(Expr::Call { name, args, span })
            }

            Rule::variable => {
                let ident = pair.into_inner().next().expect("ident is guaranteed");
                Ok(Expr::Variable(ident.as_str().to_string(), span))
            }

            Rule::qref => Ok(Expr::QualifiedRef(pair.as_str().to_string(), span)),

            Rule::bareword => Ok(Expr::Str(StringExpr::Literal(pair.as_str().to_string()), span)),

            Rule::function_def => {
                let mut inner = pair.into_inner();
                let name = inner.next().expect("func_name is guaranteed").as_str().to_string();
                let mut params = Vec::new();
                let mut body = Vec::new();
                for p in inner {
                    match p.as_rule() {
                        Rule::param_list => {
                            for v in p.into_inner() {
                                let ident =
                                    v.into_inner().next().expect("ident is guaranteed");
                                params.push(ident.as_str().to_string());
                            }
                        }
                        _ => body.push(self.build(p)?),
                    }
                }
                Ok(Expr::FunctionDef(Rc::new(FunctionDef { name, params, body }), span))
            }

            Rule::task_def => {
                if !self.options.tasks {
                    return Err(self.error(&PARSE_ILLEGAL_TASK, span));
                }
                let mut inner = pair.into_inner();
                let name = inner.next().expect("func_name is guaranteed").as_str().to_string();
                let entries = match inner.next() {
                    Some(list) => self.build_hash_entries(list)?,
                    None => Vec::new(),
                };
                Ok(Expr::TaskDef(Rc::new(TaskDef { name, entries }), span))
            }

            rule => Err(self.syntax_error(&format!("unsupported construct {:?}", rule), span)),
        }
    }

    fn build_hash_entries(&self, list: Pair<Rule>) -> Result<Vec<(Expr, Expr)>, Reported> {
        let mut entries = Vec::new();
        for entry in list.into_inner() {
            let mut kv = entry.into_inner();
            let key = self.build(kv.next().expect("key is guaranteed"))?;
            let value = self.build(kv.next().expect("value is guaranteed"))?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn build_double_string(&self, pair: Pair<Rule>, span: Span) -> Result<Expr, Reported> {
        let mut parts: Vec<StrPart> = Vec::new();
        let mut push_lit = |parts: &mut Vec<StrPart>, text: &str| {
            if let Some(StrPart::Lit(existing)) = parts.last_mut() {
                existing.push_str(text);
            } else {
                parts.push(StrPart::Lit(text.to_string()));
            }
        };
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::dq_text | Rule::dollar => push_lit(&mut parts, p.as_str()),
                Rule::dq_escape => {
                    let escaped = self.unescape_double(p.as_str());
                    push_lit(&mut parts, &escaped);
                }
                Rule::interp_braced | Rule::interp_plain => {
                    let ident = p.into_inner().next().expect("ident is guaranteed");
                    parts.push(StrPart::Var(ident.as_str().to_string()));
                }
                _ => {}
            }
        }
        let has_vars = parts.iter().any(|p| matches!(p, StrPart::Var(_)));
        if has_vars {
            Ok(Expr::Str(StringExpr::Interpolated(parts), span))
        } else {
            let text = parts
                .into_iter()
                .map(|p| match p {
                    StrPart::Lit(s) => s,
                    StrPart::Var(_) => unreachable!("filtered above"),
                })
                .collect::<String>();
            Ok(Expr::Str(StringExpr::Literal(text), span))
        }
    }

    fn unescape_double(&self, escape: &str) -> String {
        // `escape` is the raw token, e.g. `\n` or `\x41`.
        let body = &escape[1..];
        match body.chars().next().expect("escape body is non-empty") {
            'n' => "\n".to_string(),
            't' => "\t".to_string(),
            'r' => "\r".to_string(),
            '\\' => "\\".to_string(),
            '"' => "\"".to_string(),
            '$' => "$".to_string(),
            'x' if body.len() == 3 => {
                if self.options.hex_escapes {
                    let code = u32::from_str_radix(&body[1..], 16).expect("lexed as hex");
                    char::from_u32(code)
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| escape.to_string())
                } else {
                    escape.to_string()
                }
            }
            _ => escape.to_string(),
        }
    }

    fn build_epp(&self, pair: Pair<Rule>) -> Result<Expr, Reported> {
        let span = span_of(&pair);
        let mut parts = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::EOI => {}
                Rule::epp_text => parts.push(EppPart::Text(p.as_str().to_string())),
                Rule::epp_render => {
                    let expr =
                        self.build(p.into_inner().next().expect("expression is guaranteed"))?;
                    parts.push(EppPart::Render(expr));
                }
                Rule::epp_exec => {
                    let mut stmts = Vec::new();
                    for s in p.into_inner() {
                        stmts.push(self.build(s)?);
                    }
                    parts.push(EppPart::Exec(stmts));
                }
                rule => {
                    return Err(self.syntax_error(
                        &format!("unsupported template construct {:?}", rule),
                        span_of(&p),
                    ))
                }
            }
        }
        Ok(Expr::Epp(parts, span))
    }
}

fn span_of(pair: &Pair<Rule>) -> Span {
    let s = pair.as_span();
    let (line, col) = s.start_pos().line_col();
    Span {
        start: s.start(),
        end: s.end(),
        line: line as u32,
        col: col as u32,
    }
}

fn binary_op(symbol: &str) -> BinaryOp {
    match symbol {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        other => unreachable!("operator {:?} is not in the grammar", other),
    }
}

fn convert_parse_error(error: pest::error::Error<Rule>, path: &str) -> Reported {
    let (line, col) = match error.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l, c),
        pest::error::LineColLocation::Span((l, c), _) => (l, c),
    };
    let detail = match &error.variant {
        pest::error::ErrorVariant::ParsingError { .. } => error.variant.message().to_string(),
        pest::error::ErrorVariant::CustomError { message } => message.clone(),
    };
    Reported::error(
        &PARSE_SYNTAX_ERROR,
        issue_args! { "detail" => detail },
        Some(Location::new(path, line as u32, col as u32)),
    )
}

fn unescape_single(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('\'') => out.push('\''),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_regex(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'/') {
            out.push('/');
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Expr {
        parse("test", source, true, ParserOptions::default()).unwrap()
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        let e = parse("test", "", false, ParserOptions::default()).unwrap();
        assert!(matches!(e, Expr::Program(ref stmts, _) if stmts.is_empty()));
    }

    #[test]
    fn arithmetic_is_left_associative() {
        let e = parse_one("1 - 2 - 3");
        assert_eq!(e.to_pn().to_string(), "(- (- 1 2) 3)");
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        assert_eq!(parse_one("1 + 2 * 3").to_pn().to_string(), "(+ 1 (* 2 3))");
        assert_eq!(parse_one("(1 + 2) * 3").to_pn().to_string(), "(* (+ 1 2) 3)");
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(parse_one("-3").to_pn().to_string(), "-3");
        assert_eq!(parse_one("-3.5").to_pn().to_string(), "-3.5");
    }

    #[test]
    fn interpolation_splits_parts() {
        let e = parse_one(r#""a $x b""#);
        match e {
            Expr::Str(StringExpr::Interpolated(parts), _) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[1], StrPart::Var("x".to_string()));
            }
            other => panic!("expected interpolated string, got {:?}", other),
        }
    }

    #[test]
    fn plain_double_string_stays_literal() {
        let e = parse_one(r#""a \n b""#);
        assert!(matches!(e, Expr::Str(StringExpr::Literal(ref s), _) if s == "a \n b"));
    }

    #[test]
    fn hash_accepts_bareword_keys() {
        let e = parse_one("{foo => {'a.txt' => 'hi'}}");
        match e {
            Expr::HashLiteral(entries, _) => {
                assert!(matches!(
                    entries[0].0,
                    Expr::Str(StringExpr::Literal(ref s), _) if s == "foo"
                ));
            }
            other => panic!("expected hash, got {:?}", other),
        }
    }

    #[test]
    fn calls_and_qualified_references() {
        assert_eq!(
            parse_one("Example('x')").to_pn().to_string(),
            "(call \"Example\" \"x\")"
        );
        assert_eq!(parse_one("Evaluates_ok").to_pn().to_string(), "(qr \"Evaluates_ok\")");
        assert_eq!(
            parse_one("notice(1, 2)").to_pn().to_string(),
            "(call \"notice\" 1 2)"
        );
    }

    #[test]
    fn backticks_require_the_option() {
        let err = parse("test", "`raw`", true, ParserOptions::default()).unwrap_err();
        assert_eq!(err.code(), "PARSE_ILLEGAL_BACKTICK");
        let opts = ParserOptions { backtick_strings: true, ..Default::default() };
        let e = parse("test", "`$raw`", true, opts).unwrap();
        assert!(matches!(e, Expr::Str(StringExpr::Literal(ref s), _) if s == "$raw"));
    }

    #[test]
    fn hex_escapes_require_the_option() {
        let opts = ParserOptions { hex_escapes: true, ..Default::default() };
        let on = parse("test", r#""\x41""#, true, opts).unwrap();
        assert!(matches!(on, Expr::Str(StringExpr::Literal(ref s), _) if s == "A"));
        let off = parse("test", r#""\x41""#, true, ParserOptions::default()).unwrap();
        assert!(matches!(off, Expr::Str(StringExpr::Literal(ref s), _) if s == "\\x41"));
    }

    #[test]
    fn tasks_require_the_option() {
        let source = "task deploy { command => 'run' }";
        let err = parse("test", source, false, ParserOptions::default()).unwrap_err();
        assert_eq!(err.code(), "PARSE_ILLEGAL_TASK");
        let opts = ParserOptions { tasks: true, ..Default::default() };
        assert!(parse("test", source, false, opts).is_ok());
    }

    #[test]
    fn epp_mode_parses_templates() {
        let opts = ParserOptions { epp_mode: true, ..Default::default() };
        let e = parse("test", "a <%= $x %> b", false, opts).unwrap();
        match e {
            Expr::Epp(parts, _) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[0], EppPart::Text(ref t) if t == "a "));
                assert!(matches!(parts[1], EppPart::Render(_)));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn syntax_errors_carry_location() {
        let err = parse("demo.pspec", "notice(", false, ParserOptions::default()).unwrap_err();
        assert_eq!(err.code(), "PARSE_SYNTAX_ERROR");
        let loc = err.location().unwrap();
        assert_eq!(loc.file, "demo.pspec");
        assert_eq!(loc.line, 1);
    }

    #[test]
    fn lone_braces_fail_to_parse() {
        assert!(parse("t", "{", false, ParserOptions::default()).is_err());
        assert!(parse("t", "bad", false, ParserOptions::default()).is_err());
    }
}
