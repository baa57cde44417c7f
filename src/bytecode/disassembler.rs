//! Bytecode disassembler for debugging and the `bytecode` subcommand.

use std::fmt::Write;

use crate::bytecode::instruction::OpCode;
use crate::bytecode::program::Program;
use crate::runtime::value::Value;

/// Disassemble a whole program into human-readable output.
pub fn disassemble(program: &Program) -> String {
    let mut output = String::new();
    let mut offset = 0;

    while offset < program.code.len() {
        offset = disassemble_instruction(program, offset, &mut output);
    }

    output
}

/// Disassemble one instruction, returning the offset of the next.
pub fn disassemble_instruction(program: &Program, offset: usize, output: &mut String) -> usize {
    write!(output, "{:04} ", offset).unwrap();

    let byte = program.code[offset];
    let Some(op) = OpCode::from_u8(byte) else {
        writeln!(output, "Unknown opcode 0x{:02x}", byte).unwrap();
        return offset + 1;
    };

    if op.operand_size() == 0 {
        writeln!(output, "{}", op).unwrap();
        return offset + 1;
    }

    if offset + op.length() > program.code.len() {
        writeln!(output, "{} <truncated>", op).unwrap();
        return program.code.len();
    }

    let operand = program.read_u16(offset + 1);
    match op {
        OpCode::Constant | OpCode::Lookup => {
            writeln!(
                output,
                "{} {} ({})",
                op,
                operand,
                constant_str(program.constants.get(operand as usize))
            )
            .unwrap();
        }
        OpCode::Jump | OpCode::JumpIfFalse => {
            writeln!(output, "{} -> {:04}", op, operand).unwrap();
        }
        _ => {
            writeln!(output, "{} {}", op, operand).unwrap();
        }
    }

    offset + op.length()
}

/// Render a constant for the listing.
fn constant_str(constant: Option<&Value>) -> String {
    match constant {
        Some(Value::String(s)) if s.len() > 20 => format!("\"{}...\"", &s[..20]),
        Some(Value::String(s)) => format!("\"{}\"", s),
        Some(other) => other.inspect(),
        None => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Compiler;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn disassemble_source(source: &str) -> String {
        let tokens = Scanner::new(source).scan_tokens();
        let ast = Parser::new(tokens).parse().unwrap();
        let program = Compiler::new().compile(&ast).unwrap();
        disassemble(&program)
    }

    #[test]
    fn test_disassemble_simple() {
        let output = disassemble_source("return 1 + 2;");
        assert!(output.contains("PUSH 1"));
        assert!(output.contains("PUSH 2"));
        assert!(output.contains("ADD"));
        assert!(output.contains("RETURN"));
    }

    #[test]
    fn test_disassemble_echoes_constants() {
        let output = disassemble_source(r#"return Author == "Steve";"#);
        assert!(output.contains("LOOKUP 0 (\"Author\")"));
        assert!(output.contains("CONSTANT 1 (\"Steve\")"));
    }

    #[test]
    fn test_disassemble_jump_targets() {
        let output = disassemble_source("if (true) { return 1; } return 2;");
        assert!(output.contains("JUMP_IF_FALSE -> 0008"));
    }

    #[test]
    fn test_unknown_opcode_is_reported() {
        let program = Program {
            constants: Vec::new(),
            code: vec![0xFE],
        };
        assert!(disassemble(&program).contains("Unknown opcode 0xfe"));
    }
}
