use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tokens::Span;

/// A FEEL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal
    NumberLit(Decimal, Span),
    /// String literal
    StringLit(String, Span),
    /// Boolean literal
    BoolLit(bool, Span),
    /// Null literal
    NullLit(Span),
    /// Variable reference; the name may contain spaces
    Name(String, Span),
    /// Arithmetic negation: -expr
    Neg(Box<Expr>, Span),
    /// Ternary negation: not expr
    Not(Box<Expr>, Span),
    /// Binary operation
    BinOp(Box<Expr>, BinOp, Box<Expr>, Span),
    /// if c then a else b
    If {
        cond: Box<Expr>,
        then_val: Box<Expr>,
        else_val: Box<Expr>,
        span: Span,
    },
    /// for x in L return e; multiple iterators nest rightmost-fastest
    ForLoop {
        iterators: Vec<(String, Expr)>,
        body: Box<Expr>,
        span: Span,
    },
    /// some/every x in L satisfies p
    Quantified {
        kind: QuantifierKind,
        iterators: Vec<(String, Expr)>,
        body: Box<Expr>,
        span: Span,
    },
    /// Function invocation
    Call {
        callee: Box<Expr>,
        args: Vec<CallArg>,
        span: Span,
    },
    /// Member access: expr.name
    Path(Box<Expr>, String, Span),
    /// Index or filter: expr[e]
    Index(Box<Expr>, Box<Expr>, Span),
    /// Context literal: {a: 1, "b c": 2}
    ContextLit(Vec<(String, Expr)>, Span),
    /// List literal: [1, 2, 3]
    ListLit(Vec<Expr>, Span),
    /// Range literal: [a..b], (a..b], ]a..b[ ...
    RangeLit {
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
        lo_inclusive: bool,
        hi_inclusive: bool,
        span: Span,
    },
    /// value between low and high
    Between {
        value: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        span: Span,
    },
    /// value in rhs, where rhs is a range, list, or plain value
    In(Box<Expr>, Box<Expr>, Span),
    /// expr instance of type-name
    InstanceOf(Box<Expr>, String, Span),
    /// function(a, b) body — anonymous function definition
    FunctionDef {
        parameters: Vec<String>,
        body: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::NumberLit(_, s)
            | Expr::StringLit(_, s)
            | Expr::BoolLit(_, s)
            | Expr::NullLit(s)
            | Expr::Name(_, s)
            | Expr::Neg(_, s)
            | Expr::Not(_, s)
            | Expr::BinOp(_, _, _, s)
            | Expr::Path(_, _, s)
            | Expr::Index(_, _, s)
            | Expr::ContextLit(_, s)
            | Expr::ListLit(_, s)
            | Expr::In(_, _, s)
            | Expr::InstanceOf(_, _, s) => *s,
            Expr::If { span, .. }
            | Expr::ForLoop { span, .. }
            | Expr::Quantified { span, .. }
            | Expr::Call { span, .. }
            | Expr::RangeLit { span, .. }
            | Expr::Between { span, .. }
            | Expr::FunctionDef { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallArg {
    Positional(Expr),
    Named(String, Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantifierKind {
    Some,
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::Pow => write!(f, "**"),
            BinOp::Eq => write!(f, "="),
            BinOp::Ne => write!(f, "!="),
            BinOp::Lt => write!(f, "<"),
            BinOp::Le => write!(f, "<="),
            BinOp::Gt => write!(f, ">"),
            BinOp::Ge => write!(f, ">="),
            BinOp::And => write!(f, "and"),
            BinOp::Or => write!(f, "or"),
        }
    }
}

/// Comparison operator of a unary test (`>= 18`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// One alternative of a decision-table input entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnaryTest {
    /// `-` matches anything
    Wildcard(Span),
    /// Comparison against the input value: `>= 18`
    Compare(CmpOp, Expr, Span),
    /// Implicit match: equality, or membership when the expression yields a
    /// range or list
    Match(Expr, Span),
}

impl UnaryTest {
    pub fn span(&self) -> Span {
        match self {
            UnaryTest::Wildcard(s) => *s,
            UnaryTest::Compare(_, _, s) => *s,
            UnaryTest::Match(_, s) => *s,
        }
    }
}

/// A full input entry: a disjunction of alternatives, optionally wrapped in
/// `not(...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryTests {
    pub negated: bool,
    pub alternatives: Vec<UnaryTest>,
    pub span: Span,
}
