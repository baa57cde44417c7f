//! Statement AST nodes.

use std::fmt;

use crate::ast::expr::Expr;
use crate::span::Span;

/// A complete parsed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.statements.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// A bare expression: print("x");
    Expression(Expr),

    /// Variable assignment: count = 3;
    Assign { name: String, value: Expr },

    /// Conditional: if (cond) { ... } else { ... }
    If {
        condition: Expr,
        consequence: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },

    /// Halt the script with a value: return expr;
    Return(Expr),

    /// A free-standing block: { ... }
    Block(Vec<Stmt>),
}

fn write_block(f: &mut fmt::Formatter<'_>, statements: &[Stmt]) -> fmt::Result {
    write!(f, "{{ ")?;
    for stmt in statements {
        write!(f, "{} ", stmt)?;
    }
    write!(f, "}}")
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Expression(expr) => write!(f, "{};", expr),
            StmtKind::Assign { name, value } => write!(f, "{} = {};", name, value),
            StmtKind::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if ({}) ", condition)?;
                write_block(f, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " else ")?;
                    write_block(f, alternative)?;
                }
                Ok(())
            }
            StmtKind::Return(expr) => write!(f, "return {};", expr),
            StmtKind::Block(statements) => write_block(f, statements),
        }
    }
}
