//! Recursive descent parser with Pratt expression parsing for FEEL.
//!
//! Two entry points: [`Parser::parse_expression`] for literal expressions
//! and output entries, [`Parser::parse_unary_tests`] for decision-table
//! input entries. Parsing is pure and fails fast; there is no recovery
//! inside an expression.

use crate::ast::{BinOp, CallArg, CmpOp, Expr, QuantifierKind, UnaryTest, UnaryTests};
use crate::lexer;
use crate::tokens::{Span, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token {found} at line {line}, col {col}; expected {expected}")]
    Unexpected {
        found: String,
        expected: String,
        line: usize,
        col: usize,
    },
    #[error("unexpected end of input")]
    UnexpectedEof,
}

/// Lexing or parsing failure for a piece of FEEL text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeelError {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Parse a complete FEEL expression.
pub fn parse_expression(source: &str) -> Result<Expr, FeelError> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr(0)?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a decision-table input entry (a unary-test disjunction).
pub fn parse_unary_tests(source: &str) -> Result<UnaryTests, FeelError> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let tests = parser.parse_unary_tests()?;
    parser.expect_eof()?;
    Ok(tests)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_n_kind(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.current();
        if tok.kind == TokenKind::Eof {
            ParseError::UnexpectedEof
        } else {
            ParseError::Unexpected {
                found: tok.kind.to_string(),
                expected: expected.to_string(),
                line: tok.span.line,
                col: tok.span.col,
            }
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.peek_kind() == &kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span), ParseError> {
        match self.peek_kind() {
            TokenKind::Ident(_) => {
                let tok = self.advance();
                match tok.kind {
                    TokenKind::Ident(name) => Ok((name, tok.span)),
                    _ => unreachable!(),
                }
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        if self.peek_kind() == &TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    // ── Expressions ──

    pub fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let kind = self.peek_kind().clone();
            let (op, bp) = match kind {
                // Postfix: path, index/filter, call
                TokenKind::Dot => {
                    if min_bp > 15 {
                        break;
                    }
                    self.advance();
                    let (name, name_span) = self.expect_ident("member name after '.'")?;
                    let span = lhs.span().merge(name_span);
                    lhs = Expr::Path(Box::new(lhs), name, span);
                    continue;
                }
                TokenKind::LBracket => {
                    if min_bp > 15 {
                        break;
                    }
                    self.advance();
                    let idx = self.parse_expr(0)?;
                    let close = self.expect(TokenKind::RBracket, "']' after index")?;
                    let span = lhs.span().merge(close.span);
                    lhs = Expr::Index(Box::new(lhs), Box::new(idx), span);
                    continue;
                }
                TokenKind::LParen => {
                    if min_bp > 15 {
                        break;
                    }
                    self.advance();
                    let args = self.parse_call_args()?;
                    let close = self.expect(TokenKind::RParen, "')' after arguments")?;
                    let span = lhs.span().merge(close.span);
                    lhs = Expr::Call {
                        callee: Box::new(lhs),
                        args,
                        span,
                    };
                    continue;
                }
                // Comparison-level keywords
                TokenKind::Between => {
                    if min_bp > 5 {
                        break;
                    }
                    self.advance();
                    let low = self.parse_expr(7)?;
                    self.expect(TokenKind::And, "'and' in between")?;
                    let high = self.parse_expr(7)?;
                    let span = lhs.span().merge(high.span());
                    lhs = Expr::Between {
                        value: Box::new(lhs),
                        low: Box::new(low),
                        high: Box::new(high),
                        span,
                    };
                    continue;
                }
                TokenKind::In => {
                    if min_bp > 5 {
                        break;
                    }
                    self.advance();
                    // `x in >= 18` desugars to the comparison itself
                    if let Some(op) = self.leading_cmp_op() {
                        self.advance();
                        let rhs = self.parse_expr(7)?;
                        let span = lhs.span().merge(rhs.span());
                        lhs = Expr::BinOp(Box::new(lhs), cmp_to_binop(op), Box::new(rhs), span);
                    } else {
                        let rhs = self.parse_expr(6)?;
                        let span = lhs.span().merge(rhs.span());
                        lhs = Expr::In(Box::new(lhs), Box::new(rhs), span);
                    }
                    continue;
                }
                TokenKind::Instance => {
                    if min_bp > 5 {
                        break;
                    }
                    self.advance();
                    self.expect(TokenKind::Of, "'of' after instance")?;
                    let (type_name, ty_span) = self.parse_type_name()?;
                    let span = lhs.span().merge(ty_span);
                    lhs = Expr::InstanceOf(Box::new(lhs), type_name, span);
                    continue;
                }
                // Plain binary operators
                TokenKind::Or => (BinOp::Or, (1, 2)),
                TokenKind::And => (BinOp::And, (3, 4)),
                TokenKind::Eq | TokenKind::EqEq => (BinOp::Eq, (5, 6)),
                TokenKind::BangEq => (BinOp::Ne, (5, 6)),
                TokenKind::Lt => (BinOp::Lt, (5, 6)),
                TokenKind::LtEq => (BinOp::Le, (5, 6)),
                TokenKind::Gt => (BinOp::Gt, (5, 6)),
                TokenKind::GtEq => (BinOp::Ge, (5, 6)),
                TokenKind::Plus => (BinOp::Add, (7, 8)),
                TokenKind::Minus => (BinOp::Sub, (7, 8)),
                TokenKind::Star => (BinOp::Mul, (9, 10)),
                TokenKind::Slash => (BinOp::Div, (9, 10)),
                TokenKind::StarStar => (BinOp::Pow, (13, 12)), // right-assoc
                _ => break,
            };
            let (l_bp, r_bp) = bp;
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(r_bp)?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs), span);
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                let tok = self.advance();
                Ok(Expr::NumberLit(n, tok.span))
            }
            TokenKind::Str(s) => {
                let tok = self.advance();
                Ok(Expr::StringLit(s, tok.span))
            }
            TokenKind::True => Ok(Expr::BoolLit(true, self.advance().span)),
            TokenKind::False => Ok(Expr::BoolLit(false, self.advance().span)),
            TokenKind::Null => Ok(Expr::NullLit(self.advance().span)),
            TokenKind::Ident(_) => {
                let (mut name, mut span) = self.expect_ident("name")?;
                // `date and time(...)` / `years and months duration(...)`
                // lex as three tokens; stitch the builtin name back together,
                // but only when a call follows — otherwise `and` is the operator.
                if self.peek_n_kind(2) == Some(&TokenKind::LParen) {
                    if let Some(rest) = self.multiword_continuation(&name) {
                        self.advance(); // and
                        let (_, end_span) = self.expect_ident("builtin name")?;
                        name = rest;
                        span = span.merge(end_span);
                    }
                }
                Ok(Expr::Name(name, span))
            }
            TokenKind::Minus => {
                let start = self.advance().span;
                // unary binds tighter than `**`: -a ** 2 is (-a) ** 2
                let operand = self.parse_expr(14)?;
                let span = start.merge(operand.span());
                Ok(Expr::Neg(Box::new(operand), span))
            }
            TokenKind::Not => {
                let start = self.advance().span;
                let operand = self.parse_expr(14)?;
                let span = start.merge(operand.span());
                Ok(Expr::Not(Box::new(operand), span))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Some_ => self.parse_quantified(QuantifierKind::Some),
            TokenKind::Every => self.parse_quantified(QuantifierKind::Every),
            TokenKind::Function => self.parse_function_def(),
            TokenKind::LParen => self.parse_paren_or_range(),
            TokenKind::LBracket => self.parse_list_or_range(),
            TokenKind::RBracket => self.parse_open_start_range(),
            TokenKind::LBrace => self.parse_context_lit(),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// When `name` begins a split multi-word builtin name followed by a
    /// call, return the stitched name (`date and time`).
    fn multiword_continuation(&self, name: &str) -> Option<String> {
        if self.peek_kind() != &TokenKind::And {
            return None;
        }
        let next = match self.peek_n_kind(1) {
            Some(TokenKind::Ident(s)) => s.as_str(),
            _ => return None,
        };
        match (name, next) {
            ("date", "time") => Some("date and time".to_string()),
            ("years", "months duration") => Some("years and months duration".to_string()),
            _ => None,
        }
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Then, "'then'")?;
        let then_val = self.parse_expr(0)?;
        self.expect(TokenKind::Else, "'else'")?;
        let else_val = self.parse_expr(0)?;
        let span = start.merge(else_val.span());
        Ok(Expr::If {
            cond: Box::new(cond),
            then_val: Box::new(then_val),
            else_val: Box::new(else_val),
            span,
        })
    }

    fn parse_iterators(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut iterators = Vec::new();
        loop {
            let (var, _) = self.expect_ident("iteration variable")?;
            self.expect(TokenKind::In, "'in'")?;
            let source = self.parse_expr(0)?;
            iterators.push((var, source));
            if self.peek_kind() == &TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(iterators)
    }

    fn parse_for(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        let iterators = self.parse_iterators()?;
        self.expect(TokenKind::Return, "'return'")?;
        let body = self.parse_expr(0)?;
        let span = start.merge(body.span());
        Ok(Expr::ForLoop {
            iterators,
            body: Box::new(body),
            span,
        })
    }

    fn parse_quantified(&mut self, kind: QuantifierKind) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        let iterators = self.parse_iterators()?;
        self.expect(TokenKind::Satisfies, "'satisfies'")?;
        let body = self.parse_expr(0)?;
        let span = start.merge(body.span());
        Ok(Expr::Quantified {
            kind,
            iterators,
            body: Box::new(body),
            span,
        })
    }

    fn parse_function_def(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen, "'(' after function")?;
        let mut parameters = Vec::new();
        if self.peek_kind() != &TokenKind::RParen {
            loop {
                let (name, _) = self.expect_ident("parameter name")?;
                parameters.push(name);
                if self.peek_kind() == &TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after parameters")?;
        let body = self.parse_expr(0)?;
        let span = start.merge(body.span());
        Ok(Expr::FunctionDef {
            parameters,
            body: Box::new(body),
            span,
        })
    }

    fn parse_paren_or_range(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        let first = self.parse_expr(0)?;
        if self.peek_kind() == &TokenKind::DotDot {
            self.advance();
            let hi = self.parse_expr(0)?;
            let (hi_inclusive, end) = self.parse_range_close()?;
            let span = start.merge(end);
            return Ok(Expr::RangeLit {
                lo: Some(Box::new(first)),
                hi: Some(Box::new(hi)),
                lo_inclusive: false,
                hi_inclusive,
                span,
            });
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(first)
    }

    fn parse_list_or_range(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        if self.peek_kind() == &TokenKind::RBracket {
            let end = self.advance().span;
            return Ok(Expr::ListLit(Vec::new(), start.merge(end)));
        }
        let first = self.parse_expr(0)?;
        if self.peek_kind() == &TokenKind::DotDot {
            self.advance();
            let hi = self.parse_expr(0)?;
            let (hi_inclusive, end) = self.parse_range_close()?;
            let span = start.merge(end);
            return Ok(Expr::RangeLit {
                lo: Some(Box::new(first)),
                hi: Some(Box::new(hi)),
                lo_inclusive: true,
                hi_inclusive,
                span,
            });
        }
        let mut items = vec![first];
        while self.peek_kind() == &TokenKind::Comma {
            self.advance();
            items.push(self.parse_expr(0)?);
        }
        let end = self.expect(TokenKind::RBracket, "']' after list")?;
        Ok(Expr::ListLit(items, start.merge(end.span)))
    }

    /// `]a..b]` — an open-start range written with a leading `]`.
    fn parse_open_start_range(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        let lo = self.parse_expr(0)?;
        self.expect(TokenKind::DotDot, "'..' in range")?;
        let hi = self.parse_expr(0)?;
        let (hi_inclusive, end) = self.parse_range_close()?;
        let span = start.merge(end);
        Ok(Expr::RangeLit {
            lo: Some(Box::new(lo)),
            hi: Some(Box::new(hi)),
            lo_inclusive: false,
            hi_inclusive,
            span,
        })
    }

    /// `]` closes inclusive; `)` and `[` close exclusive.
    fn parse_range_close(&mut self) -> Result<(bool, Span), ParseError> {
        match self.peek_kind() {
            TokenKind::RBracket => Ok((true, self.advance().span)),
            TokenKind::RParen | TokenKind::LBracket => Ok((false, self.advance().span)),
            _ => Err(self.unexpected("range close bracket")),
        }
    }

    fn parse_context_lit(&mut self) -> Result<Expr, ParseError> {
        let start = self.advance().span;
        let mut entries = Vec::new();
        if self.peek_kind() != &TokenKind::RBrace {
            loop {
                let key = match self.peek_kind().clone() {
                    TokenKind::Ident(name) => {
                        self.advance();
                        name
                    }
                    TokenKind::Str(s) => {
                        self.advance();
                        s
                    }
                    _ => return Err(self.unexpected("context key")),
                };
                self.expect(TokenKind::Colon, "':' after context key")?;
                let value = self.parse_expr(0)?;
                entries.push((key, value));
                if self.peek_kind() == &TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBrace, "'}' after context")?;
        Ok(Expr::ContextLit(entries, start.merge(end.span)))
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>, ParseError> {
        let mut args = Vec::new();
        if self.peek_kind() == &TokenKind::RParen {
            return Ok(args);
        }
        loop {
            let named = matches!(self.peek_kind(), TokenKind::Ident(_))
                && self.peek_n_kind(1) == Some(&TokenKind::Colon);
            if named {
                let (name, _) = self.expect_ident("argument name")?;
                self.advance(); // colon
                let value = self.parse_expr(0)?;
                args.push(CallArg::Named(name, value));
            } else {
                args.push(CallArg::Positional(self.parse_expr(0)?));
            }
            if self.peek_kind() == &TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(args)
    }

    fn parse_type_name(&mut self) -> Result<(String, Span), ParseError> {
        let (mut name, mut span) = self.expect_ident("type name")?;
        if let Some(rest) = self.multiword_continuation(&name) {
            self.advance();
            let (_, end_span) = self.expect_ident("type name")?;
            name = rest;
            span = span.merge(end_span);
        }
        Ok((name, span))
    }

    fn leading_cmp_op(&self) -> Option<CmpOp> {
        match self.peek_kind() {
            TokenKind::Lt => Some(CmpOp::Lt),
            TokenKind::LtEq => Some(CmpOp::Le),
            TokenKind::Gt => Some(CmpOp::Gt),
            TokenKind::GtEq => Some(CmpOp::Ge),
            TokenKind::BangEq => Some(CmpOp::Ne),
            TokenKind::Eq | TokenKind::EqEq => Some(CmpOp::Eq),
            _ => None,
        }
    }

    // ── Unary tests ──

    pub fn parse_unary_tests(&mut self) -> Result<UnaryTests, ParseError> {
        let start = self.span();
        // `not(...)` negates the whole disjunction
        if self.peek_kind() == &TokenKind::Not && self.peek_n_kind(1) == Some(&TokenKind::LParen) {
            self.advance();
            self.advance();
            let alternatives = self.parse_test_list()?;
            let end = self.expect(TokenKind::RParen, "')' after not")?;
            return Ok(UnaryTests {
                negated: true,
                alternatives,
                span: start.merge(end.span),
            });
        }
        let alternatives = self.parse_test_list()?;
        let span = alternatives
            .iter()
            .fold(start, |acc, t| acc.merge(t.span()));
        Ok(UnaryTests {
            negated: false,
            alternatives,
            span,
        })
    }

    fn parse_test_list(&mut self) -> Result<Vec<UnaryTest>, ParseError> {
        let mut tests = vec![self.parse_single_test()?];
        while self.peek_kind() == &TokenKind::Comma {
            self.advance();
            tests.push(self.parse_single_test()?);
        }
        Ok(tests)
    }

    fn parse_single_test(&mut self) -> Result<UnaryTest, ParseError> {
        // A bare `-` is the wildcard
        if self.peek_kind() == &TokenKind::Minus
            && matches!(
                self.peek_n_kind(1),
                Some(TokenKind::Comma) | Some(TokenKind::RParen) | Some(TokenKind::Eof) | None
            )
        {
            let span = self.advance().span;
            return Ok(UnaryTest::Wildcard(span));
        }
        if let Some(op) = self.leading_cmp_op() {
            let start = self.advance().span;
            let operand = self.parse_expr(7)?;
            let span = start.merge(operand.span());
            return Ok(UnaryTest::Compare(op, operand, span));
        }
        let expr = self.parse_expr(0)?;
        let span = expr.span();
        Ok(UnaryTest::Match(expr, span))
    }
}

fn cmp_to_binop(op: CmpOp) -> BinOp {
    match op {
        CmpOp::Lt => BinOp::Lt,
        CmpOp::Le => BinOp::Le,
        CmpOp::Gt => BinOp::Gt,
        CmpOp::Ge => BinOp::Ge,
        CmpOp::Eq => BinOp::Eq,
        CmpOp::Ne => BinOp::Ne,
    }
}
