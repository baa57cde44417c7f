//! Abstract Syntax Tree for Siftlang.

pub mod expr;
pub mod stmt;

pub use expr::{Expr, ExprKind, InfixOp, PrefixOp};
pub use stmt::{Program, Stmt, StmtKind};
