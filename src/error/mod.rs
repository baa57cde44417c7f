//! Error types for every phase of script evaluation.

use crate::span::Span;
use thiserror::Error;

/// Parse-time errors.
///
/// The parser accumulates these rather than stopping at the first one;
/// compilation refuses to start while any are present.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("illegal token '{text}' at {span}")]
    IllegalToken { text: String, span: Span },

    #[error("unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unexpected end of input at {span}")]
    UnexpectedEof { span: Span },

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn illegal_token(text: impl Into<String>, span: Span) -> Self {
        Self::IllegalToken {
            text: text.into(),
            span,
        }
    }

    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(span: Span) -> Self {
        Self::UnexpectedEof { span }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::IllegalToken { span, .. } => *span,
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof { span } => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("too many constants in program (limit 65536)")]
    TooManyConstants,

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }
}

/// Errors which abort a VM run.
///
/// Each carries the operator, opcode or types involved; none is recovered
/// internally.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("truncated instruction at offset {0}")]
    TruncatedInstruction(usize),

    #[error("constant index {0} out of range")]
    InvalidConstantIndex(usize),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("attempted division by zero: {0}")]
    DivisionByZero(String),

    #[error("the function {0} does not exist")]
    UnknownFunction(String),

    #[error("missing return at the end of the script")]
    MissingReturn,

    #[error("the bytecode program is empty")]
    EmptyProgram,
}

/// Join accumulated parser errors into one message, one per line.
fn join_parser_errors(errors: &[ParserError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A unified error type for the embedding surface.
#[derive(Debug, Error)]
pub enum SiftError {
    #[error("{}", join_parser_errors(.0))]
    Parse(Vec<ParserError>),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
