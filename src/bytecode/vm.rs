//! Stack-based virtual machine executing compiled filter programs.
//!
//! The VM is handed a program (constants + bytecode), an environment and
//! an optional input record, and interprets the bytecode until a RETURN
//! opcode hands back a value. Constants are loaded to the stack on
//! demand; record fields are discovered by reflection on first use and
//! cached for the rest of the run.

use std::collections::HashMap;

use crate::bytecode::instruction::OpCode;
use crate::bytecode::program::Program;
use crate::bytecode::stack::Stack;
use crate::error::RuntimeError;
use crate::runtime::environment::Environment;
use crate::runtime::record::Record;
use crate::runtime::value::{Value, ValueKind};

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// The virtual machine.
///
/// Single-threaded within a run: one instance executes one program
/// against one record at a time. The field cache lives for exactly one
/// [`Vm::run`] call.
pub struct Vm<'a> {
    program: &'a Program,
    environment: &'a mut Environment,
    stack: Stack,
    /// Record fields, materialised on the first name lookup of a run.
    fields: HashMap<String, Value>,
    fields_loaded: bool,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a Program, environment: &'a mut Environment) -> Self {
        Self {
            program,
            environment,
            stack: Stack::new(),
            fields: HashMap::new(),
            fields_loaded: false,
        }
    }

    /// Interpret the program against the given record.
    ///
    /// Terminates on a RETURN opcode. The instruction set supports
    /// control flow, so a hand-built program may run forever; reaching
    /// the end of the bytecode without returning is an error.
    pub fn run(&mut self, record: Option<&dyn Record>) -> VmResult<Value> {
        if self.program.is_empty() {
            return Err(RuntimeError::EmptyProgram);
        }

        self.stack = Stack::new();
        self.fields.clear();
        self.fields_loaded = false;

        let code = &self.program.code;
        let mut ip = 0;

        while ip < code.len() {
            let op = OpCode::from_u8(code[ip]).ok_or(RuntimeError::UnknownOpcode(code[ip]))?;
            let length = op.length();

            let mut operand = 0usize;
            if length > 1 {
                if ip + length > code.len() {
                    return Err(RuntimeError::TruncatedInstruction(ip));
                }
                operand = u16::from_be_bytes([code[ip + 1], code[ip + 2]]) as usize;
            }

            match op {
                OpCode::Nop => {}

                OpCode::Push => {
                    self.stack.push(Value::Integer(operand as i64));
                }

                OpCode::Constant => {
                    let value = self.constant(operand)?;
                    self.stack.push(value);
                }

                OpCode::Lookup => {
                    let name = self.constant(operand)?.inspect();
                    let value = self.lookup(record, &name);
                    self.stack.push(value);
                }

                OpCode::Set => {
                    let name = self.stack.pop()?;
                    let value = self.stack.pop()?;
                    self.environment.set_variable(name.inspect(), value);
                }

                OpCode::Add
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide
                | OpCode::Modulo
                | OpCode::Power
                | OpCode::Less
                | OpCode::LessEqual
                | OpCode::Greater
                | OpCode::GreaterEqual
                | OpCode::Equal
                | OpCode::NotEqual
                | OpCode::Matches
                | OpCode::NotMatches
                | OpCode::And
                | OpCode::Or => {
                    self.binary_operation(op)?;
                }

                OpCode::Bang => {
                    let value = self.stack.pop()?;
                    // Not truthiness: only the canonical false-likes negate
                    // to true.
                    let result = match value {
                        Value::Boolean(true) => false,
                        Value::Boolean(false) => true,
                        Value::Null => true,
                        _ => false,
                    };
                    self.stack.push(Value::Boolean(result));
                }

                OpCode::Minus => {
                    let value = self.stack.pop()?;
                    let result = match value {
                        Value::Integer(n) => Value::Integer(n.wrapping_neg()),
                        Value::Float(n) => Value::Float(-n),
                        other => {
                            return Err(RuntimeError::TypeMismatch(format!(
                                "unsupported type for negation: {}",
                                other.kind()
                            )))
                        }
                    };
                    self.stack.push(result);
                }

                OpCode::Root => {
                    let value = self.stack.pop()?;
                    let result = match value {
                        Value::Integer(n) => Value::Float((n as f64).sqrt()),
                        Value::Float(n) => Value::Float(n.sqrt()),
                        other => {
                            return Err(RuntimeError::TypeMismatch(format!(
                                "unsupported type for square root: {}",
                                other.kind()
                            )))
                        }
                    };
                    self.stack.push(result);
                }

                OpCode::Array => {
                    let mut elements = vec![Value::Null; operand];
                    for slot in (0..operand).rev() {
                        elements[slot] = self.stack.pop()?;
                    }
                    self.stack.push(Value::Array(elements));
                }

                OpCode::ArrayIndex => {
                    let index = self.stack.pop()?;
                    let left = self.stack.pop()?;
                    let value = self.index_expression(left, index)?;
                    self.stack.push(value);
                }

                OpCode::True => self.stack.push(Value::Boolean(true)),
                OpCode::False => self.stack.push(Value::Boolean(false)),

                OpCode::Jump => {
                    ip = operand;
                    continue;
                }

                OpCode::JumpIfFalse => {
                    let condition = self.stack.pop()?;
                    if !condition.is_truthy() {
                        ip = operand;
                        continue;
                    }
                }

                OpCode::Call => {
                    self.call_function(operand)?;
                }

                OpCode::Return => {
                    return self.stack.pop();
                }
            }

            ip += length;
        }

        // Ran off the end without a RETURN: the script is malformed. We
        // could treat this as returning false, but users should be
        // explicit.
        Err(RuntimeError::MissingReturn)
    }

    fn constant(&self, index: usize) -> VmResult<Value> {
        self.program
            .constants
            .get(index)
            .cloned()
            .ok_or(RuntimeError::InvalidConstantIndex(index))
    }

    /// Resolve a name: variables first, then cached record fields, then
    /// null.
    fn lookup(&mut self, record: Option<&dyn Record>, name: &str) -> Value {
        // Remove the legacy "$" prefix, if present.
        let name = name.strip_prefix('$').unwrap_or(name);

        if let Some(value) = self.environment.get_variable(name) {
            return value;
        }

        if !self.fields_loaded {
            self.inspect_record(record);
        }

        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Discover the record's fields. Called on the first name lookup of a
    /// run, so a script that never touches the record never pays for
    /// reflection.
    fn inspect_record(&mut self, record: Option<&dyn Record>) {
        self.fields_loaded = true;

        if let Some(record) = record {
            for key in record.keys() {
                let value = record.get(&key);
                self.fields.insert(key, value);
            }
        }
    }

    // ===== Binary operators =====

    /// Execute an operation against two operands: "foo == bar", 2 + 3...
    ///
    /// Dispatch is over the pair of type tags. And/or go first so they
    /// apply at any operand types; the mixed-numeric arms run before the
    /// type-mismatch check, so that error only fires for genuinely
    /// incompatible pairs.
    fn binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;

        if op == OpCode::And {
            let result = left.is_truthy() && right.is_truthy();
            self.stack.push(Value::Boolean(result));
            return Ok(());
        }
        if op == OpCode::Or {
            let result = left.is_truthy() || right.is_truthy();
            self.stack.push(Value::Boolean(result));
            return Ok(());
        }

        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => self.integer_infix(op, *l, *r)?,
            (Value::Float(l), Value::Float(r)) => self.float_infix(op, *l, *r)?,
            (Value::Float(l), Value::Integer(r)) => self.float_infix(op, *l, *r as f64)?,
            (Value::Integer(l), Value::Float(r)) => self.float_infix(op, *l as f64, *r)?,
            (Value::String(l), Value::String(r)) => {
                let l = l.clone();
                let r = r.clone();
                self.string_infix(op, &l, &r)?
            }
            _ if left.kind() == right.kind() => {
                // Booleans (and the remaining same-kind pairs) compare
                // through their inspect forms; "false" < "true" holds,
                // which is surprising but deterministic.
                let l = left.inspect();
                let r = right.inspect();
                self.string_infix(op, &l, &r)?
            }
            _ => {
                return Err(RuntimeError::TypeMismatch(format!(
                    "{} {} {}",
                    left.kind(),
                    op,
                    right.kind()
                )))
            }
        };

        self.stack.push(result);
        Ok(())
    }

    /// integer OP integer
    fn integer_infix(&mut self, op: OpCode, left: i64, right: i64) -> VmResult<Value> {
        let value = match op {
            OpCode::Add => Value::Integer(left.wrapping_add(right)),
            OpCode::Subtract => Value::Integer(left.wrapping_sub(right)),
            OpCode::Multiply => Value::Integer(left.wrapping_mul(right)),
            OpCode::Divide => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero(format!(
                        "{} / {}",
                        left, right
                    )));
                }
                Value::Integer(left / right)
            }
            OpCode::Modulo => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero(format!(
                        "{} % {}",
                        left, right
                    )));
                }
                Value::Integer(left % right)
            }
            OpCode::Power => Value::Integer((left as f64).powf(right as f64) as i64),
            OpCode::Less => Value::Boolean(left < right),
            OpCode::LessEqual => Value::Boolean(left <= right),
            OpCode::Greater => Value::Boolean(left > right),
            OpCode::GreaterEqual => Value::Boolean(left >= right),
            OpCode::Equal => Value::Boolean(left == right),
            OpCode::NotEqual => Value::Boolean(left != right),
            _ => {
                return Err(self.unknown_operator(ValueKind::Integer, op, ValueKind::Integer));
            }
        };
        Ok(value)
    }

    /// float OP float; mixed pairs promote the integer side first.
    fn float_infix(&mut self, op: OpCode, left: f64, right: f64) -> VmResult<Value> {
        let value = match op {
            OpCode::Add => Value::Float(left + right),
            OpCode::Subtract => Value::Float(left - right),
            OpCode::Multiply => Value::Float(left * right),
            OpCode::Divide => {
                if right == 0.0 {
                    return Err(RuntimeError::DivisionByZero(format!(
                        "{} / {}",
                        left, right
                    )));
                }
                Value::Float(left / right)
            }
            OpCode::Modulo => {
                // Modulus operates on the integer truncations.
                if right as i64 == 0 {
                    return Err(RuntimeError::DivisionByZero(format!(
                        "{} % {}",
                        left, right
                    )));
                }
                Value::Float((left as i64 % right as i64) as f64)
            }
            OpCode::Power => Value::Float(left.powf(right)),
            OpCode::Less => Value::Boolean(left < right),
            OpCode::LessEqual => Value::Boolean(left <= right),
            OpCode::Greater => Value::Boolean(left > right),
            OpCode::GreaterEqual => Value::Boolean(left >= right),
            OpCode::Equal => Value::Boolean(left == right),
            OpCode::NotEqual => Value::Boolean(left != right),
            _ => {
                return Err(self.unknown_operator(ValueKind::Float, op, ValueKind::Float));
            }
        };
        Ok(value)
    }

    /// string OP string
    fn string_infix(&mut self, op: OpCode, left: &str, right: &str) -> VmResult<Value> {
        let value = match op {
            OpCode::Equal => Value::Boolean(left == right),
            OpCode::NotEqual => Value::Boolean(left != right),
            OpCode::Less => Value::Boolean(left < right),
            OpCode::LessEqual => Value::Boolean(left <= right),
            OpCode::Greater => Value::Boolean(left > right),
            OpCode::GreaterEqual => Value::Boolean(left >= right),
            OpCode::Add => Value::String(format!("{}{}", left, right)),
            OpCode::Matches => Value::Boolean(self.call_match(left, right)?),
            OpCode::NotMatches => Value::Boolean(!self.call_match(left, right)?),
            _ => {
                return Err(self.unknown_operator(ValueKind::String, op, ValueKind::String));
            }
        };
        Ok(value)
    }

    /// `~=` and `!~` delegate to the `match` builtin, which the host may
    /// have replaced.
    fn call_match(&mut self, haystack: &str, pattern: &str) -> VmResult<bool> {
        let function = self
            .environment
            .get_function("match")
            .ok_or_else(|| RuntimeError::UnknownFunction("match".to_string()))?;

        let args = [
            Value::String(haystack.to_string()),
            Value::String(pattern.to_string()),
        ];
        Ok(function.call(&args).is_truthy())
    }

    fn unknown_operator(&self, left: ValueKind, op: OpCode, right: ValueKind) -> RuntimeError {
        RuntimeError::UnknownOperator(format!("{} {} {}", left, op, right))
    }

    // ===== Indexing =====

    /// Look up the element at the given index of an array or string.
    fn index_expression(&mut self, left: Value, index: Value) -> VmResult<Value> {
        if !matches!(left.kind(), ValueKind::Array | ValueKind::String) {
            return Err(RuntimeError::TypeMismatch(format!(
                "the index operator can only be applied to strings and arrays, not {}",
                left.kind()
            )));
        }
        let Value::Integer(idx) = index else {
            return Err(RuntimeError::TypeMismatch(format!(
                "the index operator must be given an integer, not {}",
                index.kind()
            )));
        };

        match left {
            Value::String(s) => {
                // Byte-indexed on the UTF-8 form; out of range is null,
                // not an error. A byte inside a multi-byte character
                // renders as U+FFFD.
                let bytes = s.as_bytes();
                if idx < 0 || idx as usize >= bytes.len() {
                    return Ok(Value::Null);
                }
                let unit = [bytes[idx as usize]];
                Ok(Value::String(
                    String::from_utf8_lossy(&unit).into_owned(),
                ))
            }
            Value::Array(elements) => {
                if idx < 0 || idx as usize >= elements.len() {
                    return Ok(Value::Null);
                }
                Ok(elements[idx as usize].clone())
            }
            _ => unreachable!("kind checked above"),
        }
    }

    // ===== Calls =====

    /// Pop the function name and `argc` arguments (in reverse, so the
    /// last popped is position zero), invoke, and push the result.
    fn call_function(&mut self, argc: usize) -> VmResult<()> {
        let name = self.stack.pop()?;

        let mut args = vec![Value::Null; argc];
        for slot in (0..argc).rev() {
            args[slot] = self.stack.pop()?;
        }

        let name = name.inspect();
        let function = self
            .environment
            .get_function(&name)
            .ok_or(RuntimeError::UnknownFunction(name))?;

        self.stack.push(function.call(&args));
        Ok(())
    }
}
