//! Abstract syntax tree for the expression language.
//!
//! Every node carries a [`Span`] for diagnostics. The tree also knows how to
//! serialise itself into PN form (see [`crate::pn`]), which is how parse
//! results are compared structurally.

use std::rc::Rc;

use crate::pn::Pn;

/// Byte range plus the 1-based line/column of the start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

/// A string literal: plain, or carrying interpolation parts.
#[derive(Debug, Clone, PartialEq)]
pub enum StringExpr {
    Literal(String),
    Interpolated(Vec<StrPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(String),
    Var(String),
}

/// One segment of an EPP template.
#[derive(Debug, Clone, PartialEq)]
pub enum EppPart {
    Text(String),
    Render(Expr),
    Exec(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDef {
    pub name: String,
    pub entries: Vec<(Expr, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Program(Vec<Expr>, Span),
    Block(Vec<Expr>, Span),
    Undef(Span),
    Boolean(bool, Span),
    Integer(i64, Span),
    Float(f64, Span),
    Str(StringExpr, Span),
    Regexp(String, Span),
    Array(Vec<Expr>, Span),
    HashLiteral(Vec<(Expr, Expr)>, Span),
    Variable(String, Span),
    Assignment(Box<Expr>, Box<Expr>, Span),
    Unary(UnaryOp, Box<Expr>, Span),
    Binary(BinaryOp, Box<Expr>, Box<Expr>, Span),
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    QualifiedRef(String, Span),
    Epp(Vec<EppPart>, Span),
    FunctionDef(Rc<FunctionDef>, Span),
    TaskDef(Rc<TaskDef>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Program(_, s)
            | Expr::Block(_, s)
            | Expr::Undef(s)
            | Expr::Boolean(_, s)
            | Expr::Integer(_, s)
            | Expr::Float(_, s)
            | Expr::Str(_, s)
            | Expr::Regexp(_, s)
            | Expr::Array(_, s)
            | Expr::HashLiteral(_, s)
            | Expr::Variable(_, s)
            | Expr::Assignment(_, _, s)
            | Expr::Unary(_, _, s)
            | Expr::Binary(_, _, _, s)
            | Expr::Call { span: s, .. }
            | Expr::QualifiedRef(_, s)
            | Expr::Epp(_, s)
            | Expr::FunctionDef(_, s)
            | Expr::TaskDef(_, s) => *s,
        }
    }

    /// Strips at most one enclosing `Program` and then at most one
    /// single-statement `Block`. Used when comparing parse results, so that
    /// a one-statement source and its wrapped forms serialise identically.
    pub fn strip_single(&self) -> &Expr {
        let mut expr = self;
        if let Expr::Program(stmts, _) = expr {
            if stmts.len() == 1 {
                expr = &stmts[0];
            } else {
                return expr;
            }
        }
        if let Expr::Block(stmts, _) = expr {
            if stmts.len() == 1 {
                expr = &stmts[0];
            }
        }
        expr
    }

    /// The PN form of this tree.
    pub fn to_pn(&self) -> Pn {
        match self {
            Expr::Program(stmts, _) => Pn::call("program", stmts.iter().map(Expr::to_pn).collect()),
            Expr::Block(stmts, _) => Pn::call("block", stmts.iter().map(Expr::to_pn).collect()),
            Expr::Undef(_) => Pn::nil(),
            Expr::Boolean(b, _) => Pn::bool(*b),
            Expr::Integer(n, _) => Pn::int(*n),
            Expr::Float(n, _) => Pn::float(*n),
            Expr::Str(StringExpr::Literal(s), _) => Pn::string(s),
            Expr::Str(StringExpr::Interpolated(parts), _) => Pn::call(
                "concat",
                parts
                    .iter()
                    .map(|p| match p {
                        StrPart::Lit(s) => Pn::string(s),
                        StrPart::Var(name) => Pn::call("var", vec![Pn::string(name)]),
                    })
                    .collect(),
            ),
            Expr::Regexp(pattern, _) => Pn::call("regexp", vec![Pn::string(pattern)]),
            Expr::Array(items, _) => Pn::List(items.iter().map(Expr::to_pn).collect()),
            Expr::HashLiteral(entries, _) => {
                let mut elements = Vec::with_capacity(entries.len() * 2);
                for (k, v) in entries {
                    elements.push(k.to_pn());
                    elements.push(v.to_pn());
                }
                Pn::call("hash", elements)
            }
            Expr::Variable(name, _) => Pn::call("var", vec![Pn::string(name)]),
            Expr::Assignment(lhs, rhs, _) => Pn::call("=", vec![lhs.to_pn(), rhs.to_pn()]),
            Expr::Unary(UnaryOp::Neg, e, _) => Pn::call("neg", vec![e.to_pn()]),
            Expr::Unary(UnaryOp::Not, e, _) => Pn::call("not", vec![e.to_pn()]),
            Expr::Binary(op, l, r, _) => Pn::call(op.symbol(), vec![l.to_pn(), r.to_pn()]),
            Expr::Call { name, args, .. } => {
                let mut elements = Vec::with_capacity(args.len() + 1);
                elements.push(Pn::string(name));
                elements.extend(args.iter().map(Expr::to_pn));
                Pn::call("call", elements)
            }
            Expr::QualifiedRef(name, _) => Pn::call("qr", vec![Pn::string(name)]),
            Expr::Epp(parts, _) => Pn::call(
                "epp",
                parts
                    .iter()
                    .map(|p| match p {
                        EppPart::Text(s) => Pn::string(s),
                        EppPart::Render(e) => Pn::call("render", vec![e.to_pn()]),
                        EppPart::Exec(stmts) => {
                            Pn::call("render-s", stmts.iter().map(Expr::to_pn).collect())
                        }
                    })
                    .collect(),
            ),
            Expr::FunctionDef(def, _) => Pn::call(
                "function",
                vec![
                    Pn::string(&def.name),
                    Pn::List(def.params.iter().map(|p| Pn::string(p)).collect()),
                    Pn::call("block", def.body.iter().map(Expr::to_pn).collect()),
                ],
            ),
            Expr::TaskDef(def, _) => {
                let mut elements = Vec::with_capacity(def.entries.len() * 2);
                for (k, v) in &def.entries {
                    elements.push(k.to_pn());
                    elements.push(v.to_pn());
                }
                Pn::call("task", vec![Pn::string(&def.name), Pn::call("hash", elements)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::default()
    }

    #[test]
    fn strip_removes_one_program_then_one_single_statement_block() {
        let inner = Expr::Integer(1, sp());
        let block = Expr::Block(vec![inner.clone()], sp());
        let program = Expr::Program(vec![block.clone()], sp());
        assert_eq!(program.strip_single(), &inner);
        assert_eq!(block.strip_single(), &inner);
        assert_eq!(inner.strip_single(), &inner);
    }

    #[test]
    fn strip_keeps_multi_statement_wrappers() {
        let program = Expr::Program(vec![Expr::Integer(1, sp()), Expr::Integer(2, sp())], sp());
        assert_eq!(program.strip_single(), &program);
        // A block of two statements inside a program is stripped only down
        // to the block.
        let block = Expr::Block(vec![Expr::Integer(1, sp()), Expr::Integer(2, sp())], sp());
        let wrapped = Expr::Program(vec![block.clone()], sp());
        assert_eq!(wrapped.strip_single(), &block);
    }

    #[test]
    fn binary_to_pn_uses_operator_heads() {
        let e = Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Integer(1, sp())),
            Box::new(Expr::Integer(2, sp())),
            sp(),
        );
        assert_eq!(e.to_pn().to_string(), "(+ 1 2)");
    }
}
