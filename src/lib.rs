//! Siftlang: an embeddable scripting language for filtering events.
//!
//! A host application supplies a small C-like script and an input record;
//! the engine returns a boolean (or other scalar) decision. The canonical
//! use is deciding whether an incoming event should trigger some
//! downstream action:
//!
//! ```
//! use siftlang::{compile, run, Environment};
//! use serde_json::json;
//!
//! let program = compile(r#"if (Author == "Steve") { return true; } return false;"#).unwrap();
//! let record = json!({ "Author": "Steve" });
//!
//! let mut env = Environment::new();
//! let result = run(&program, &mut env, Some(&record)).unwrap();
//! assert!(result.is_truthy());
//! ```
//!
//! # Pipeline
//!
//! Source text flows through the lexer, a Pratt parser, a bytecode
//! compiler and a peephole optimizer into a [`Program`] (constant pool +
//! bytecode), which a stack-based VM interprets against a reflected view
//! of the input record. Compiled programs are immutable and may be shared
//! between any number of VM instances.

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod span;

pub use bytecode::Program;
pub use error::SiftError;
pub use runtime::{Environment, Record, Value};

use bytecode::{optimizer, Compiler, Vm};
use lexer::Scanner;
use parser::Parser;

/// Scan source text into its token stream.
pub fn tokenize(source: &str) -> Vec<lexer::Token> {
    Scanner::new(source).scan_tokens()
}

/// Parse source text into an AST without compiling.
pub fn parse(source: &str) -> Result<ast::Program, SiftError> {
    let tokens = Scanner::new(source).scan_tokens();
    Parser::new(tokens).parse().map_err(SiftError::Parse)
}

/// Compile source text into an optimised program.
///
/// Purely functional: all parse errors are accumulated and returned
/// together, and compilation refuses to proceed while any exist.
pub fn compile(source: &str) -> Result<Program, SiftError> {
    compile_with_options(source, true)
}

/// Compile source text, optionally skipping the optimizer.
pub fn compile_with_options(source: &str, optimize: bool) -> Result<Program, SiftError> {
    let ast = parse(source)?;
    let program = Compiler::new().compile(&ast)?;
    if optimize {
        Ok(optimizer::optimize(&program))
    } else {
        Ok(program)
    }
}

/// Execute a compiled program against an environment and an optional
/// record, returning the script's result value.
pub fn run(
    program: &Program,
    environment: &mut Environment,
    record: Option<&dyn Record>,
) -> Result<Value, SiftError> {
    let mut vm = Vm::new(program, environment);
    Ok(vm.run(record)?)
}
