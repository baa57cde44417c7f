//! Variable and function tables shared between the host and the VM.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::runtime::builtins;
use crate::runtime::value::Value;

/// A host-provided function callable from scripts.
///
/// Callables receive the argument values in order and return a value;
/// they cannot raise into the VM. Failure is signalled by returning
/// `Null` (or `false`, for predicates).
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    func: Rc<dyn Fn(&[Value]) -> Value>,
}

impl NativeFunction {
    pub fn new(name: impl Into<String>, func: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.func.as_ref())(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// The environment a script runs against: named variables plus the table
/// of callable functions.
///
/// Created by the host, populated before execution, and shared with the
/// VM; variables may be mutated between runs. The built-in functions are
/// always present from construction.
#[derive(Debug, Clone)]
pub struct Environment {
    variables: HashMap<String, Value>,
    functions: HashMap<String, NativeFunction>,
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Self {
            variables: HashMap::new(),
            functions: HashMap::new(),
        };
        builtins::install(&mut env);
        env
    }

    /// Set a variable. Scripts see variables before record fields of the
    /// same name.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    pub fn delete_variable(&mut self, name: &str) {
        self.variables.remove(name);
    }

    /// Register a host function, replacing any existing one of the same
    /// name (including built-ins).
    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Value + 'static,
    ) {
        let name = name.into();
        let function = NativeFunction::new(name.clone(), func);
        self.functions.insert(name, function);
    }

    pub fn get_function(&self, name: &str) -> Option<NativeFunction> {
        self.functions.get(name).cloned()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
