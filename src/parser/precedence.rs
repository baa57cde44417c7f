//! Operator precedence for Pratt parsing.

use crate::lexer::TokenKind;

/// Operator precedence levels (higher = tighter binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Or = 1,         // ||
    And = 2,        // &&
    Equality = 3,   // == !=
    Comparison = 4, // < <= > >=
    Match = 5,      // ~= !~
    Term = 6,       // + -
    Factor = 7,     // * / %
    Power = 8,      // **
    Unary = 9,      // ! - √
    Call = 10,      // []
}

pub fn get_precedence(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::Comparison
        }
        TokenKind::Match | TokenKind::NotMatch => Precedence::Match,
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
        TokenKind::Power => Precedence::Power,
        TokenKind::LeftBracket => Precedence::Call,
        _ => Precedence::None,
    }
}
