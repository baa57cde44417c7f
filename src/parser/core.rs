//! Core parser struct and helper methods.

use crate::ast::Program;
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

/// The parser for Siftlang.
///
/// Errors are accumulated rather than fatal: after a bad statement the
/// parser skips to a likely statement boundary and keeps going, so a
/// single pass reports everything it can.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
    pub(crate) errors: Vec<ParserError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parse a complete program, or every error found along the way.
    pub fn parse(&mut self) -> Result<Program, Vec<ParserError>> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Program::new(statements))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    /// Skip to the next statement boundary after an error.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous_is(&TokenKind::Semicolon) {
                return;
            }
            match self.peek().kind {
                TokenKind::If | TokenKind::Return | TokenKind::RightBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn previous_is(&self, kind: &TokenKind) -> bool {
        self.current > 0 && &self.tokens[self.current - 1].kind == kind
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let index = if self.current + n < self.tokens.len() {
            self.current + n
        } else {
            self.tokens.len() - 1
        };
        &self.tokens[index]
    }

    pub(crate) fn previous_span(&self) -> Span {
        self.tokens[self.current.saturating_sub(1)].span
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else if self.is_at_end() {
            Err(ParserError::unexpected_eof(self.current_span()))
        } else {
            Err(ParserError::unexpected_token(
                format!("{}", kind),
                format!("{}", self.peek().kind),
                self.current_span(),
            ))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParserError::unexpected_token(
                "identifier",
                format!("{}", self.peek().kind),
                self.current_span(),
            )),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }
}
