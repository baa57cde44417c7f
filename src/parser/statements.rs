//! Statement parsing.

use crate::ast::{Stmt, StmtKind};
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        match &self.peek().kind {
            TokenKind::If => self.if_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::LeftBrace => {
                let start = self.current_span();
                let statements = self.brace_block()?;
                let span = start.merge(&self.previous_span());
                Ok(Stmt::new(StmtKind::Block(statements), span))
            }
            TokenKind::Identifier(_) if self.peek_nth(1).kind == TokenKind::Assign => {
                self.assignment_statement()
            }
            _ => self.expression_statement(),
        }
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        self.advance(); // consume `if`

        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;

        let consequence = self.brace_block()?;

        let alternative = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // else-if chains nest as a single-statement alternative
                Some(vec![self.if_statement()?])
            } else {
                Some(self.brace_block()?)
            }
        } else {
            None
        };

        let span = start.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        self.advance(); // consume `return`

        let value = self.expression()?;
        self.match_token(&TokenKind::Semicolon);

        let span = start.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn assignment_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Assign)?;

        let value = self.expression()?;
        self.match_token(&TokenKind::Semicolon);

        let span = start.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Assign { name, value }, span))
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        let expr = self.expression()?;
        self.match_token(&TokenKind::Semicolon);

        let span = start.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    pub(crate) fn brace_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LeftBrace)?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }
}
