//! PN (prefix notation) trees.
//!
//! PN is the compact s-expression form used to describe an expected AST in
//! `Parses_to`. This module holds the tree type, its printer, and the
//! literal parser. The parser is hand-rolled rather than grammar-driven
//! because its error positions must be re-based onto the spec-file location
//! of the enclosing call: the literal is a string nested inside a larger
//! source.

use std::fmt;

use crate::issue_args;
use crate::issues::PSPEC_PN_PARSE_ERROR;
use crate::lang::issue::{Location, Reported};

#[derive(Debug, Clone, PartialEq)]
pub enum PnValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pn {
    Literal(PnValue),
    List(Vec<Pn>),
    Map(Vec<(String, Pn)>),
    Call { name: String, elements: Vec<Pn> },
}

impl Pn {
    pub fn nil() -> Pn {
        Pn::Literal(PnValue::Nil)
    }

    pub fn bool(b: bool) -> Pn {
        Pn::Literal(PnValue::Bool(b))
    }

    pub fn int(n: i64) -> Pn {
        Pn::Literal(PnValue::Int(n))
    }

    pub fn float(n: f64) -> Pn {
        Pn::Literal(PnValue::Float(n))
    }

    pub fn string(s: &str) -> Pn {
        Pn::Literal(PnValue::String(s.to_string()))
    }

    pub fn call(name: &str, elements: Vec<Pn>) -> Pn {
        Pn::Call { name: name.to_string(), elements }
    }
}

impl fmt::Display for Pn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pn::Literal(PnValue::Nil) => f.write_str("nil"),
            Pn::Literal(PnValue::Bool(b)) => write!(f, "{}", b),
            Pn::Literal(PnValue::Int(n)) => write!(f, "{}", n),
            Pn::Literal(PnValue::Float(n)) => {
                // A float must reparse as a float, so keep a decimal point.
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Pn::Literal(PnValue::String(s)) => write_quoted(f, s),
            Pn::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Pn::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, ":{} {}", k, v)?;
                }
                f.write_str("}")
            }
            Pn::Call { name, elements } => {
                write!(f, "({}", name)?;
                for e in elements {
                    write!(f, " {}", e)?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c if (c as u32) < 0x20 => write!(f, "\\o{:03o}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

/// Parses one PN literal. Error positions are reported relative to `base`,
/// the location of the enclosing call in the spec file.
pub fn parse_pn(content: &str, base: &Location) -> Result<Pn, Reported> {
    let mut parser = PnParser {
        content,
        chars: content.char_indices().peekable(),
        base: base.clone(),
    };
    let pn = parser.parse_next()?;
    parser.skip_whitespace();
    if let Some(&(off, _)) = parser.chars.peek() {
        return Err(parser.fail("unexpected trailing content", off));
    }
    Ok(pn)
}

struct PnParser<'a> {
    content: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    base: Location,
}

impl<'a> PnParser<'a> {
    fn fail(&self, detail: &str, offset: usize) -> Reported {
        let before = &self.content[..offset.min(self.content.len())];
        let lines_before = before.matches('\n').count() as u32;
        let line_start = before.rfind('\n').map(|p| p + 1).unwrap_or(0);
        let col_in_line = (offset - line_start) as u32 + 1;
        let location = Location {
            file: self.base.file.clone(),
            line: self.base.line + lines_before,
            col: if lines_before == 0 { self.base.col + col_in_line } else { col_in_line },
        };
        Reported::error(
            &PSPEC_PN_PARSE_ERROR,
            issue_args! { "detail" => detail },
            Some(location),
        )
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        self.skip_whitespace();
        self.chars.peek().copied()
    }

    fn end_offset(&self) -> usize {
        self.content.len()
    }

    fn parse_next(&mut self) -> Result<Pn, Reported> {
        let (off, c) = match self.peek() {
            Some(t) => t,
            None => return Err(self.fail("unexpected end of input", self.end_offset())),
        };
        match c {
            '[' => {
                self.chars.next();
                let items = self.parse_elements(']')?;
                Ok(Pn::List(items))
            }
            '{' => {
                self.chars.next();
                self.parse_map()
            }
            '(' => {
                self.chars.next();
                self.parse_call()
            }
            '"' => {
                self.chars.next();
                let s = self.parse_string(off)?;
                Ok(Pn::Literal(PnValue::String(s)))
            }
            '-' => {
                self.chars.next();
                match self.chars.peek() {
                    Some(&(_, d)) if d.is_ascii_digit() => {
                        let n = self.parse_number(off)?;
                        Ok(match n {
                            PnValue::Int(v) => Pn::Literal(PnValue::Int(-v)),
                            PnValue::Float(v) => Pn::Literal(PnValue::Float(-v)),
                            other => Pn::Literal(other),
                        })
                    }
                    _ => Err(self.fail("digit expected after '-'", off)),
                }
            }
            c if c.is_ascii_digit() => {
                let n = self.parse_number(off)?;
                Ok(Pn::Literal(n))
            }
            _ => {
                let ident = self.parse_identifier();
                match ident.as_str() {
                    "true" => Ok(Pn::bool(true)),
                    "false" => Ok(Pn::bool(false)),
                    "nil" => Ok(Pn::nil()),
                    "" => Err(self.fail("unexpected token", off)),
                    _ => Err(self.fail("unexpected token", off)),
                }
            }
        }
    }

    fn parse_elements(&mut self, closer: char) -> Result<Vec<Pn>, Reported> {
        let mut elements = Vec::new();
        loop {
            match self.peek() {
                None => {
                    let msg = match closer {
                        ']' => "expected ']'",
                        ')' => "expected ')'",
                        _ => "expected closer",
                    };
                    return Err(self.fail(msg, self.end_offset()));
                }
                Some((_, c)) if c == closer => {
                    self.chars.next();
                    return Ok(elements);
                }
                Some(_) => elements.push(self.parse_next()?),
            }
        }
    }

    fn parse_map(&mut self) -> Result<Pn, Reported> {
        let mut entries = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.fail("expected '}'", self.end_offset())),
                Some((_, '}')) => {
                    self.chars.next();
                    return Ok(Pn::Map(entries));
                }
                Some((off, ':')) => {
                    self.chars.next();
                    let key = self.parse_identifier();
                    if key.is_empty() {
                        return Err(self.fail("map key must be an identifier", off));
                    }
                    let value = self.parse_next()?;
                    entries.push((key, value));
                }
                Some((off, _)) => {
                    return Err(self.fail("map key must be an identifier", off));
                }
            }
        }
    }

    fn parse_call(&mut self) -> Result<Pn, Reported> {
        let off = match self.peek() {
            Some((off, _)) => off,
            None => return Err(self.fail("expected call name", self.end_offset())),
        };
        let name = self.parse_identifier();
        if name.is_empty() {
            return Err(self.fail("expected call name", off));
        }
        let elements = self.parse_elements(')')?;
        Ok(Pn::Call { name, elements })
    }

    fn parse_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | ':' | '"') {
                break;
            }
            ident.push(c);
            self.chars.next();
        }
        ident
    }

    fn parse_string(&mut self, start: usize) -> Result<String, Reported> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.fail("unterminated string", start)),
                Some((_, '"')) => return Ok(out),
                Some((esc_off, '\\')) => match self.chars.next() {
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, 'o')) => {
                        let mut code = 0u32;
                        for _ in 0..3 {
                            match self.chars.next() {
                                Some((_, d)) if ('0'..='7').contains(&d) => {
                                    code = code * 8 + d.to_digit(8).unwrap();
                                }
                                _ => {
                                    return Err(
                                        self.fail("three octal digits expected after '\\o'", esc_off)
                                    )
                                }
                            }
                        }
                        match char::from_u32(code) {
                            Some(c) => out.push(c),
                            None => {
                                return Err(self.fail("invalid octal escape", esc_off));
                            }
                        }
                    }
                    _ => return Err(self.fail("invalid escape sequence", esc_off)),
                },
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn parse_number(&mut self, start: usize) -> Result<PnValue, Reported> {
        let mut text = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if let Some(&(off, '.')) = self.chars.peek() {
            is_float = true;
            text.push('.');
            self.chars.next();
            if !self.push_digits(&mut text) {
                return Err(self.fail("digit expected after '.'", off));
            }
        }
        if let Some(&(off, c)) = self.chars.peek() {
            if c == 'e' || c == 'E' {
                is_float = true;
                text.push(c);
                self.chars.next();
                if let Some(&(_, sign)) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.chars.next();
                    }
                }
                if !self.push_digits(&mut text) {
                    return Err(self.fail("digit expected in exponent", off));
                }
            }
        }
        if is_float {
            text.parse::<f64>()
                .map(PnValue::Float)
                .map_err(|_| self.fail("invalid float literal", start))
        } else {
            text.parse::<i64>()
                .map(PnValue::Int)
                .map_err(|_| self.fail("integer literal out of range", start))
        }
    }

    fn push_digits(&mut self, text: &mut String) -> bool {
        let mut any = false;
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.chars.next();
                any = true;
            } else {
                break;
            }
        }
        any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Pn {
        parse_pn(s, &Location::default()).unwrap()
    }

    fn parse_err(s: &str) -> Reported {
        parse_pn(s, &Location::default()).unwrap_err()
    }

    #[test]
    fn parses_calls_lists_and_maps() {
        assert_eq!(parse("(+ 1 2)"), Pn::call("+", vec![Pn::int(1), Pn::int(2)]));
        assert_eq!(
            parse("[1 \"a\" true nil]"),
            Pn::List(vec![Pn::int(1), Pn::string("a"), Pn::bool(true), Pn::nil()])
        );
        assert_eq!(
            parse("{:a 1 :b (f)}"),
            Pn::Map(vec![
                ("a".to_string(), Pn::int(1)),
                ("b".to_string(), Pn::call("f", vec![])),
            ])
        );
    }

    #[test]
    fn parses_numbers() {
        assert_eq!(parse("-3"), Pn::int(-3));
        assert_eq!(parse("3.5"), Pn::float(3.5));
        assert_eq!(parse("-2e3"), Pn::float(-2000.0));
        assert_eq!(parse("1.5e-1"), Pn::float(0.15));
    }

    #[test]
    fn parses_string_escapes() {
        assert_eq!(parse(r#""a\tb\o101""#), Pn::string("a\tbA"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_err("\"abc").to_string().contains("unterminated string"));
        assert!(parse_err("(f 1").to_string().contains("expected ')'"));
        assert!(parse_err("{1 2}").to_string().contains("identifier"));
        assert!(parse_err("-x").to_string().contains("digit expected after '-'"));
        assert!(parse_err("1.").to_string().contains("digit expected after '.'"));
        assert!(parse_err("1e").to_string().contains("exponent"));
    }

    #[test]
    fn error_positions_are_rebased_onto_the_call_site() {
        let base = Location::new("arith.pspec", 10, 20);
        let err = parse_pn("(f \n  \"oops", &base).unwrap_err();
        let loc = err.location().unwrap();
        assert_eq!(loc.line, 11);
        assert_eq!(loc.file, "arith.pspec");
    }

    #[test]
    fn print_parse_round_trip() {
        let trees = vec![
            Pn::call(
                "+",
                vec![Pn::int(1), Pn::float(2.0), Pn::string("x\n\"y\\"), Pn::nil()],
            ),
            Pn::List(vec![Pn::bool(false), Pn::Map(vec![("k".into(), Pn::int(-1))])]),
            Pn::call("f", vec![Pn::call("g", vec![Pn::string("\u{1}")])]),
        ];
        for t in trees {
            assert_eq!(parse(&t.to_string()), t);
        }
    }
}
