//! Expression parsing using Pratt precedence.

use crate::ast::{Expr, ExprKind, InfixOp, PrefixOp};
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};
use super::precedence::{get_precedence, Precedence};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::None)
    }

    fn parse_precedence(&mut self, min_precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while get_precedence(&self.peek().kind) > min_precedence {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        if self.is_at_end() {
            return Err(ParserError::unexpected_eof(self.current_span()));
        }

        let token = self.advance();
        let start_span = token.span;

        match &token.kind {
            TokenKind::IntLiteral(n) => Ok(Expr::new(ExprKind::IntegerLiteral(*n), start_span)),
            TokenKind::FloatLiteral(n) => Ok(Expr::new(ExprKind::FloatLiteral(*n), start_span)),
            TokenKind::StringLiteral(s) => {
                Ok(Expr::new(ExprKind::StringLiteral(s.clone()), start_span))
            }
            TokenKind::RegexLiteral(pattern) => {
                Ok(Expr::new(ExprKind::RegexLiteral(pattern.clone()), start_span))
            }
            TokenKind::True => Ok(Expr::new(ExprKind::BooleanLiteral(true), start_span)),
            TokenKind::False => Ok(Expr::new(ExprKind::BooleanLiteral(false), start_span)),

            TokenKind::Identifier(name) => {
                if self.check(&TokenKind::LeftParen) {
                    self.parse_call(name.clone(), start_span)
                } else {
                    Ok(Expr::new(ExprKind::Identifier(name.clone()), start_span))
                }
            }

            // A parenthesized expression contributes no node of its own.
            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }

            TokenKind::LeftBracket => self.parse_array(start_span),

            TokenKind::Bang => self.parse_prefix_op(PrefixOp::Bang, start_span),
            TokenKind::Minus => self.parse_prefix_op(PrefixOp::Minus, start_span),
            TokenKind::Root => self.parse_prefix_op(PrefixOp::Root, start_span),

            TokenKind::Illegal(text) => Err(ParserError::illegal_token(text.clone(), start_span)),

            other => Err(ParserError::unexpected_token(
                "expression",
                format!("{}", other),
                start_span,
            )),
        }
    }

    fn parse_prefix_op(
        &mut self,
        operator: PrefixOp,
        start_span: crate::span::Span,
    ) -> ParseResult<Expr> {
        let operand = self.parse_precedence(Precedence::Power)?;
        let span = start_span.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::Prefix {
                operator,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_infix(&mut self, left: Expr) -> ParseResult<Expr> {
        let token = self.advance();

        if token.kind == TokenKind::LeftBracket {
            let index = self.expression()?;
            self.expect(&TokenKind::RightBracket)?;
            let span = left.span.merge(&self.previous_span());
            return Ok(Expr::new(
                ExprKind::Index {
                    object: Box::new(left),
                    index: Box::new(index),
                },
                span,
            ));
        }

        let operator = match &token.kind {
            TokenKind::Plus => InfixOp::Add,
            TokenKind::Minus => InfixOp::Subtract,
            TokenKind::Star => InfixOp::Multiply,
            TokenKind::Slash => InfixOp::Divide,
            TokenKind::Percent => InfixOp::Modulo,
            TokenKind::Power => InfixOp::Power,
            TokenKind::EqualEqual => InfixOp::Equal,
            TokenKind::BangEqual => InfixOp::NotEqual,
            TokenKind::Less => InfixOp::Less,
            TokenKind::LessEqual => InfixOp::LessEqual,
            TokenKind::Greater => InfixOp::Greater,
            TokenKind::GreaterEqual => InfixOp::GreaterEqual,
            TokenKind::Match => InfixOp::Matches,
            TokenKind::NotMatch => InfixOp::NotMatches,
            TokenKind::And => InfixOp::And,
            TokenKind::Or => InfixOp::Or,
            other => {
                return Err(ParserError::unexpected_token(
                    "operator",
                    format!("{}", other),
                    token.span,
                ))
            }
        };

        let precedence = get_precedence(&token.kind);
        let right = self.parse_precedence(precedence)?;
        let span = left.span.merge(&right.span);

        Ok(Expr::new(
            ExprKind::Infix {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_call(&mut self, function: String, start_span: crate::span::Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let arguments = self.parse_expression_list(&TokenKind::RightParen)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(
            ExprKind::Call {
                function,
                arguments,
            },
            span,
        ))
    }

    fn parse_array(&mut self, start_span: crate::span::Span) -> ParseResult<Expr> {
        let elements = self.parse_expression_list(&TokenKind::RightBracket)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::ArrayLiteral(elements), span))
    }

    /// Parse a comma-separated expression list up to (and including) the
    /// closing delimiter.
    fn parse_expression_list(&mut self, closing: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();

        if self.match_token(closing) {
            return Ok(items);
        }

        items.push(self.expression()?);
        while self.match_token(&TokenKind::Comma) {
            items.push(self.expression()?);
        }

        self.expect(closing)?;
        Ok(items)
    }
}
