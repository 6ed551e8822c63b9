//! Lexer for FEEL expressions and unary tests.
//!
//! Two FEEL quirks shape this scanner. Identifiers may contain spaces
//! (`Full Name`), so the lexer absorbs a space into a name exactly when the
//! next word continues an identifier and is not a keyword. And `-` starts a
//! number literal only when the previous token cannot end an operand;
//! otherwise it is the subtraction operator.

use crate::tokens::{Span, Token, TokenKind};
use crate::value::parse_decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {line}, col {col}")]
    UnexpectedChar { ch: char, line: usize, col: usize },
    #[error("unterminated string at line {line}, col {col}")]
    UnterminatedString { line: usize, col: usize },
    #[error("unknown escape '\\{ch}' at line {line}, col {col}")]
    UnknownEscape { ch: char, line: usize, col: usize },
    #[error("invalid unicode escape at line {line}, col {col}")]
    InvalidUnicodeEscape { line: usize, col: usize },
    #[error("invalid number at line {line}, col {col}")]
    InvalidNumber { line: usize, col: usize },
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    byte_offset: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            byte_offset: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        self.byte_offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn span_from(&self, so: usize, sl: usize, sc: usize) -> Span {
        Span::new(so, self.byte_offset, sl, sc)
    }

    fn mark(&self) -> (usize, usize, usize) {
        (self.byte_offset, self.line, self.col)
    }

    /// Skip whitespace and `//` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            self.skip_trivia();
            let Some(ch) = self.current() else {
                let (so, sl, sc) = self.mark();
                tokens.push(Token::new(TokenKind::Eof, self.span_from(so, sl, sc)));
                break;
            };
            let token = if ch == '"' {
                self.read_string()?
            } else if ch.is_ascii_digit() {
                self.read_number()?
            } else if ch == '-' && self.minus_starts_number(&tokens) {
                self.read_number()?
            } else if ch.is_alphabetic() || ch == '_' {
                self.read_identifier()
            } else {
                self.read_operator()?
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// `-` begins a literal when followed by a digit and the previous token
    /// cannot end an operand.
    fn minus_starts_number(&self, tokens: &[Token]) -> bool {
        if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return false;
        }
        match tokens.last() {
            None => true,
            Some(tok) => !tok.kind.ends_operand(),
        }
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = self.mark();
        let mut text = String::new();
        if self.current() == Some('-') {
            text.push('-');
            self.advance();
        }
        while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        // A '.' continues the number only when followed by a digit;
        // `1..2` keeps the range operator intact.
        if self.current() == Some('.') && matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
        }
        if matches!(self.current(), Some('e') | Some('E')) {
            let mut lookahead = self.pos + 1;
            if matches!(self.source.get(lookahead), Some('+') | Some('-')) {
                lookahead += 1;
            }
            if matches!(self.source.get(lookahead), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
                if matches!(self.current(), Some('+') | Some('-')) {
                    text.push(self.advance().unwrap());
                }
                while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.advance().unwrap());
                }
            }
        }
        let value = parse_decimal(&text).ok_or(LexError::InvalidNumber { line: sl, col: sc })?;
        Ok(Token::new(TokenKind::Number(value), self.span_from(so, sl, sc)))
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = self.mark();
        self.advance(); // opening quote
        let mut buf = String::new();
        loop {
            match self.current() {
                None => return Err(LexError::UnterminatedString { line: sl, col: sc }),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    self.process_escape(&mut buf, sl, sc)?;
                }
                Some(c) => {
                    buf.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token::new(TokenKind::Str(buf), self.span_from(so, sl, sc)))
    }

    /// Process an escape sequence after consuming the backslash
    fn process_escape(&mut self, buf: &mut String, sl: usize, sc: usize) -> Result<(), LexError> {
        match self.current() {
            Some('n') => {
                buf.push('\n');
                self.advance();
            }
            Some('t') => {
                buf.push('\t');
                self.advance();
            }
            Some('r') => {
                buf.push('\r');
                self.advance();
            }
            Some('\\') => {
                buf.push('\\');
                self.advance();
            }
            Some('"') => {
                buf.push('"');
                self.advance();
            }
            Some('u') => {
                self.advance();
                let ch = self.read_unicode_escape(sl, sc)?;
                buf.push(ch);
            }
            Some(c) => return Err(LexError::UnknownEscape { ch: c, line: sl, col: sc }),
            None => return Err(LexError::UnterminatedString { line: sl, col: sc }),
        }
        Ok(())
    }

    /// Read `\uXXXX` or `\u{...}` after the `u` has been consumed.
    fn read_unicode_escape(&mut self, sl: usize, sc: usize) -> Result<char, LexError> {
        let mut hex = String::new();
        if self.current() == Some('{') {
            self.advance();
            while let Some(c) = self.current() {
                if c == '}' {
                    break;
                }
                hex.push(c);
                self.advance();
            }
            if self.current() != Some('}') {
                return Err(LexError::InvalidUnicodeEscape { line: sl, col: sc });
            }
            self.advance();
        } else {
            for _ in 0..4 {
                match self.current() {
                    Some(c) if c.is_ascii_hexdigit() => {
                        hex.push(c);
                        self.advance();
                    }
                    _ => return Err(LexError::InvalidUnicodeEscape { line: sl, col: sc }),
                }
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(LexError::InvalidUnicodeEscape { line: sl, col: sc })
    }

    fn read_identifier(&mut self) -> Token {
        let (so, sl, sc) = self.mark();
        let mut name = String::new();
        self.read_word(&mut name);

        // A lone keyword is never the start of a multi-word name.
        if let Some(kind) = TokenKind::keyword(&name) {
            return Token::new(kind, self.span_from(so, sl, sc));
        }

        // Absorb `<spaces> <word>` while the next word continues the name.
        loop {
            let mut la = self.pos;
            while self.source.get(la) == Some(&' ') {
                la += 1;
            }
            if la == self.pos {
                break;
            }
            let mut end = la;
            while matches!(self.source.get(end), Some(c) if c.is_alphanumeric() || *c == '_') {
                end += 1;
            }
            if end == la {
                break;
            }
            let word: String = self.source[la..end].iter().collect();
            if TokenKind::keyword(&word).is_some() {
                break;
            }
            while self.pos < end {
                self.advance();
            }
            name.push(' ');
            name.push_str(&word);
        }
        Token::new(TokenKind::Ident(name), self.span_from(so, sl, sc))
    }

    fn read_word(&mut self, buf: &mut String) {
        while matches!(self.current(), Some(c) if c.is_alphanumeric() || c == '_') {
            buf.push(self.advance().unwrap());
        }
    }

    fn read_operator(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = self.mark();
        let ch = self.advance().expect("caller checked current");
        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => {
                if self.current() == Some('*') {
                    self.advance();
                    TokenKind::StarStar
                } else {
                    TokenKind::Star
                }
            }
            '/' => TokenKind::Slash,
            '<' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '=' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::BangEq
                } else {
                    return Err(LexError::UnexpectedChar {
                        ch: '!',
                        line: sl,
                        col: sc,
                    });
                }
            }
            '.' => {
                if self.current() == Some('.') {
                    self.advance();
                    TokenKind::DotDot
                } else {
                    TokenKind::Dot
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            other => {
                return Err(LexError::UnexpectedChar {
                    ch: other,
                    line: sl,
                    col: sc,
                })
            }
        };
        Ok(Token::new(kind, self.span_from(so, sl, sc)))
    }
}

/// Tokenize a FEEL source string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}
