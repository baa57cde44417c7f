//! Bytecode compiler: lowers the AST onto the opcode set.

use crate::ast::{Expr, ExprKind, InfixOp, PrefixOp, Stmt, StmtKind};
use crate::bytecode::instruction::OpCode;
use crate::bytecode::program::Program;
use crate::error::CompileError;
use crate::runtime::value::Value;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// The bytecode compiler.
///
/// Walks the AST in post-order emitting opcodes. Jumps are emitted with a
/// placeholder operand and patched once the destination offset is known;
/// operands are absolute byte offsets from the start of the program.
pub struct Compiler {
    program: Program,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            program: Program::new(),
        }
    }

    /// Compile a parsed script into a program.
    pub fn compile(&mut self, ast: &crate::ast::Program) -> CompileResult<Program> {
        for stmt in &ast.statements {
            self.statement(stmt)?;
        }
        Ok(std::mem::take(&mut self.program))
    }

    // ===== Statements =====

    fn statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => self.expression(expr),

            StmtKind::Assign { name, value } => {
                self.expression(value)?;
                let name_idx = self.constant(Value::String(name.clone()))?;
                self.emit_op(OpCode::Constant);
                self.emit_u16(name_idx);
                self.emit_op(OpCode::Set);
                Ok(())
            }

            StmtKind::Return(expr) => {
                self.expression(expr)?;
                self.emit_op(OpCode::Return);
                Ok(())
            }

            StmtKind::Block(statements) => {
                for stmt in statements {
                    self.statement(stmt)?;
                }
                Ok(())
            }

            StmtKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.expression(condition)?;

                // Branch over the consequence when the condition is falsey.
                let false_jump = self.emit_jump(OpCode::JumpIfFalse);

                for stmt in consequence {
                    self.statement(stmt)?;
                }

                match alternative {
                    Some(alternative) => {
                        let end_jump = self.emit_jump(OpCode::Jump);
                        self.patch_jump(false_jump);

                        for stmt in alternative {
                            self.statement(stmt)?;
                        }
                        self.patch_jump(end_jump);
                    }
                    None => {
                        self.patch_jump(false_jump);
                    }
                }
                Ok(())
            }
        }
    }

    // ===== Expressions =====

    fn expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            // Small non-negative integers fit in the operand itself.
            ExprKind::IntegerLiteral(n) => {
                if (0..=u16::MAX as i64).contains(n) {
                    self.emit_op(OpCode::Push);
                    self.emit_u16(*n as u16);
                } else {
                    let idx = self.constant(Value::Integer(*n))?;
                    self.emit_op(OpCode::Constant);
                    self.emit_u16(idx);
                }
                Ok(())
            }

            ExprKind::FloatLiteral(n) => {
                let idx = self.constant(Value::Float(*n))?;
                self.emit_op(OpCode::Constant);
                self.emit_u16(idx);
                Ok(())
            }

            ExprKind::StringLiteral(s) => {
                let idx = self.constant(Value::String(s.clone()))?;
                self.emit_op(OpCode::Constant);
                self.emit_u16(idx);
                Ok(())
            }

            // A regex literal travels as its textual form; the match
            // operators hand it to the regex engine at run time.
            ExprKind::RegexLiteral(pattern) => {
                let idx = self.constant(Value::String(pattern.clone()))?;
                self.emit_op(OpCode::Constant);
                self.emit_u16(idx);
                Ok(())
            }

            ExprKind::BooleanLiteral(true) => {
                self.emit_op(OpCode::True);
                Ok(())
            }
            ExprKind::BooleanLiteral(false) => {
                self.emit_op(OpCode::False);
                Ok(())
            }

            ExprKind::ArrayLiteral(elements) => {
                if elements.len() > u16::MAX as usize {
                    return Err(CompileError::new(
                        "array literal has too many elements",
                        expr.span,
                    ));
                }
                for element in elements {
                    self.expression(element)?;
                }
                self.emit_op(OpCode::Array);
                self.emit_u16(elements.len() as u16);
                Ok(())
            }

            ExprKind::Identifier(name) => {
                let idx = self.constant(Value::String(name.clone()))?;
                self.emit_op(OpCode::Lookup);
                self.emit_u16(idx);
                Ok(())
            }

            ExprKind::Prefix { operator, operand } => {
                self.expression(operand)?;
                self.emit_op(match operator {
                    PrefixOp::Bang => OpCode::Bang,
                    PrefixOp::Minus => OpCode::Minus,
                    PrefixOp::Root => OpCode::Root,
                });
                Ok(())
            }

            ExprKind::Infix {
                left,
                operator,
                right,
            } => {
                self.expression(left)?;
                self.expression(right)?;
                self.emit_op(Self::infix_opcode(*operator));
                Ok(())
            }

            ExprKind::Index { object, index } => {
                self.expression(object)?;
                self.expression(index)?;
                self.emit_op(OpCode::ArrayIndex);
                Ok(())
            }

            ExprKind::Call {
                function,
                arguments,
            } => {
                if arguments.len() > u16::MAX as usize {
                    return Err(CompileError::new("call has too many arguments", expr.span));
                }
                for argument in arguments {
                    self.expression(argument)?;
                }
                let name_idx = self.constant(Value::String(function.clone()))?;
                self.emit_op(OpCode::Constant);
                self.emit_u16(name_idx);
                self.emit_op(OpCode::Call);
                self.emit_u16(arguments.len() as u16);
                Ok(())
            }
        }
    }

    fn infix_opcode(operator: InfixOp) -> OpCode {
        match operator {
            InfixOp::Add => OpCode::Add,
            InfixOp::Subtract => OpCode::Subtract,
            InfixOp::Multiply => OpCode::Multiply,
            InfixOp::Divide => OpCode::Divide,
            InfixOp::Modulo => OpCode::Modulo,
            InfixOp::Power => OpCode::Power,
            InfixOp::Equal => OpCode::Equal,
            InfixOp::NotEqual => OpCode::NotEqual,
            InfixOp::Less => OpCode::Less,
            InfixOp::LessEqual => OpCode::LessEqual,
            InfixOp::Greater => OpCode::Greater,
            InfixOp::GreaterEqual => OpCode::GreaterEqual,
            InfixOp::Matches => OpCode::Matches,
            InfixOp::NotMatches => OpCode::NotMatches,
            // Short-circuit happens in the VM, not via branches.
            InfixOp::And => OpCode::And,
            InfixOp::Or => OpCode::Or,
        }
    }

    // ===== Bytecode emission =====

    fn emit_op(&mut self, op: OpCode) {
        self.program.write_op(op);
    }

    fn emit_u16(&mut self, value: u16) {
        self.program.write_u16(value);
    }

    /// Emit a branch with a placeholder operand; returns the operand's
    /// offset for later patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        let operand = self.program.current_offset();
        self.emit_u16(0xFFFF);
        operand
    }

    /// Point the placeholder at `operand_offset` to the current offset.
    fn patch_jump(&mut self, operand_offset: usize) {
        let target = self.program.current_offset() as u16;
        self.program.patch_u16(operand_offset, target);
    }

    fn constant(&mut self, value: Value) -> CompileResult<u16> {
        self.program
            .add_constant(value)
            .ok_or(CompileError::TooManyConstants)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn compile_source(source: &str) -> Program {
        let tokens = Scanner::new(source).scan_tokens();
        let ast = Parser::new(tokens).parse().expect("parse error");
        Compiler::new().compile(&ast).expect("compile error")
    }

    fn op(o: OpCode) -> u8 {
        o as u8
    }

    #[test]
    fn test_small_integers_use_push() {
        let program = compile_source("return 1 + 2;");
        assert_eq!(
            program.code,
            vec![
                op(OpCode::Push),
                0,
                1,
                op(OpCode::Push),
                0,
                2,
                op(OpCode::Add),
                op(OpCode::Return),
            ]
        );
        assert!(program.constants.is_empty());
    }

    #[test]
    fn test_large_and_negative_integers_use_the_pool() {
        let program = compile_source("return 70000;");
        assert_eq!(program.constants, vec![Value::Integer(70000)]);
        assert_eq!(
            program.code,
            vec![op(OpCode::Constant), 0, 0, op(OpCode::Return)]
        );

        // -1 parses as prefix minus over 1
        let program = compile_source("return -1;");
        assert_eq!(
            program.code,
            vec![
                op(OpCode::Push),
                0,
                1,
                op(OpCode::Minus),
                op(OpCode::Return)
            ]
        );
    }

    #[test]
    fn test_boundary_literals() {
        let program = compile_source("return 65535;");
        assert_eq!(
            program.code,
            vec![op(OpCode::Push), 0xFF, 0xFF, op(OpCode::Return)]
        );

        let program = compile_source("return 65536;");
        assert_eq!(program.constants, vec![Value::Integer(65536)]);
    }

    #[test]
    fn test_identifier_lookup() {
        let program = compile_source("return Author;");
        assert_eq!(program.constants, vec![Value::String("Author".to_string())]);
        assert_eq!(
            program.code,
            vec![op(OpCode::Lookup), 0, 0, op(OpCode::Return)]
        );
    }

    #[test]
    fn test_call_pushes_args_then_name() {
        let program = compile_source("return len([1, 2, 3]);");
        assert_eq!(program.constants, vec![Value::String("len".to_string())]);
        assert_eq!(
            program.code,
            vec![
                op(OpCode::Push),
                0,
                1,
                op(OpCode::Push),
                0,
                2,
                op(OpCode::Push),
                0,
                3,
                op(OpCode::Array),
                0,
                3,
                op(OpCode::Constant),
                0,
                0,
                op(OpCode::Call),
                0,
                1,
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn test_assignment_emits_set() {
        let program = compile_source("count = 3;");
        assert_eq!(program.constants, vec![Value::String("count".to_string())]);
        assert_eq!(
            program.code,
            vec![
                op(OpCode::Push),
                0,
                3,
                op(OpCode::Constant),
                0,
                0,
                op(OpCode::Set),
            ]
        );
    }

    #[test]
    fn test_if_patches_past_consequence() {
        let program = compile_source("if (true) { return 1; } return 2;");
        // 0 TRUE
        // 1 JUMP_IF_FALSE 8
        // 4 PUSH 1
        // 7 RETURN
        // 8 PUSH 2
        // 11 RETURN
        assert_eq!(
            program.code,
            vec![
                op(OpCode::True),
                op(OpCode::JumpIfFalse),
                0,
                8,
                op(OpCode::Push),
                0,
                1,
                op(OpCode::Return),
                op(OpCode::Push),
                0,
                2,
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn test_if_else_patches_both_jumps() {
        let program = compile_source("if (true) { return 1; } else { return 2; }");
        // 0 TRUE
        // 1 JUMP_IF_FALSE 11
        // 4 PUSH 1
        // 7 RETURN
        // 8 JUMP 15
        // 11 PUSH 2
        // 14 RETURN
        assert_eq!(
            program.code,
            vec![
                op(OpCode::True),
                op(OpCode::JumpIfFalse),
                0,
                11,
                op(OpCode::Push),
                0,
                1,
                op(OpCode::Return),
                op(OpCode::Jump),
                0,
                15,
                op(OpCode::Push),
                0,
                2,
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn test_regex_literal_is_a_string_constant() {
        let program = compile_source("return Message ~= /panic/i;");
        assert!(program
            .constants
            .contains(&Value::String("(?i)panic".to_string())));
        assert_eq!(program.code[program.code.len() - 2], op(OpCode::Matches));
    }

    #[test]
    fn test_constants_shared_across_uses() {
        let program = compile_source(r#"return Author == "Author";"#);
        // the identifier name and the string literal are the same atom
        assert_eq!(program.constants, vec![Value::String("Author".to_string())]);
    }

    // Every jump operand lands on an instruction boundary.
    #[test]
    fn test_jump_targets_are_instruction_boundaries() {
        let sources = [
            "if (a) { return 1; } return 2;",
            "if (a) { return 1; } else { return 2; }",
            "if (a) { if (b) { return 1; } } else { return 2; } return 3;",
            "if (a && b || !c) { return 1; } return 2;",
        ];

        for source in sources {
            let program = compile_source(source);

            let mut boundaries = std::collections::HashSet::new();
            let mut offset = 0;
            while offset < program.code.len() {
                boundaries.insert(offset);
                let op = OpCode::from_u8(program.code[offset]).expect("valid opcode");
                offset += op.length();
            }
            boundaries.insert(program.code.len());

            let mut offset = 0;
            while offset < program.code.len() {
                let op = OpCode::from_u8(program.code[offset]).expect("valid opcode");
                if matches!(op, OpCode::Jump | OpCode::JumpIfFalse) {
                    let target = program.read_u16(offset + 1) as usize;
                    assert!(
                        boundaries.contains(&target),
                        "jump at {} targets non-boundary {} in {:?}",
                        offset,
                        target,
                        source
                    );
                }
                offset += op.length();
            }
        }
    }
}
