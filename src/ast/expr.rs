//! Expression AST nodes.

use std::fmt;

use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: 42
    IntegerLiteral(i64),
    /// Float literal: 3.14
    FloatLiteral(f64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Boolean literal: true, false
    BooleanLiteral(bool),
    /// Regex literal, stored in its textual form: /panic/i carries "(?i)panic"
    RegexLiteral(String),
    /// Array literal: [1, 2, 3]
    ArrayLiteral(Vec<Expr>),

    /// Variable or record-field reference: Author, $ip
    Identifier(String),

    /// Prefix operation: !x, -x, √x
    Prefix {
        operator: PrefixOp,
        operand: Box<Expr>,
    },

    /// Infix operation: a + b
    Infix {
        left: Box<Expr>,
        operator: InfixOp,
        right: Box<Expr>,
    },

    /// Index expression: arr[i]
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },

    /// Call of a host-provided function: len(x)
    Call {
        function: String,
        arguments: Vec<Expr>,
    },
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Bang,
    Minus,
    Root,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Bang => write!(f, "!"),
            PrefixOp::Minus => write!(f, "-"),
            PrefixOp::Root => write!(f, "√"),
        }
    }
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Matches,
    NotMatches,
    And,
    Or,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfixOp::Add => write!(f, "+"),
            InfixOp::Subtract => write!(f, "-"),
            InfixOp::Multiply => write!(f, "*"),
            InfixOp::Divide => write!(f, "/"),
            InfixOp::Modulo => write!(f, "%"),
            InfixOp::Power => write!(f, "**"),
            InfixOp::Equal => write!(f, "=="),
            InfixOp::NotEqual => write!(f, "!="),
            InfixOp::Less => write!(f, "<"),
            InfixOp::LessEqual => write!(f, "<="),
            InfixOp::Greater => write!(f, ">"),
            InfixOp::GreaterEqual => write!(f, ">="),
            InfixOp::Matches => write!(f, "~="),
            InfixOp::NotMatches => write!(f, "!~"),
            InfixOp::And => write!(f, "&&"),
            InfixOp::Or => write!(f, "||"),
        }
    }
}

/// Escape a string literal back into source form.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

// The Display output is a reparsable dump: feeding it back through the
// parser yields the same tree shape.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::IntegerLiteral(n) => write!(f, "{}", n),
            ExprKind::FloatLiteral(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            ExprKind::StringLiteral(s) => write!(f, "\"{}\"", escape(s)),
            ExprKind::BooleanLiteral(b) => write!(f, "{}", b),
            ExprKind::RegexLiteral(pattern) => write!(f, "/{}/", pattern.replace('/', "\\/")),
            ExprKind::ArrayLiteral(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            ExprKind::Identifier(name) => write!(f, "{}", name),
            ExprKind::Prefix { operator, operand } => write!(f, "({}{})", operator, operand),
            ExprKind::Infix {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            ExprKind::Index { object, index } => write!(f, "({}[{}])", object, index),
            ExprKind::Call {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", argument)?;
                }
                write!(f, ")")
            }
        }
    }
}
