//! The bytecode virtual machine.

use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use crate::compiler;
use crate::error::{InterpretationError, RuntimeError};
use crate::prelude::{Chunk, OpCode, Value};

/// Used as the minimum capacity of the stack.
/// Since we're using a growable [Vec], the stack size can be arbitrarily large.
const STACK_SIZE: usize = 256;

/// Maintains state for the Lox virtual machine.
///
/// Globals persist across calls to [VM::interpret], which is why they live here rather than on [VmWithChunk].
#[derive(Default)]
pub struct VM {
    globals: HashMap<Rc<str>, Value>,
}

/// A VM with an active chunk and an output sink for `print` statements.
struct VmWithChunk<'a, 'out> {
    /// Instruction pointer --- index into the chunk for the next opcode to be executed
    ip: usize,
    /// Value stack -- modified as elements are pushed and popped from the stack.
    stack: Vec<Value>,
    chunk: &'a Chunk,
    globals: &'a mut HashMap<Rc<str>, Value>,
    out: &'out mut dyn Write,
}

/// Fetches the next bytecode in the chunk, **AND** increments the instruction pointer.
///
/// Note: use [current_ip] to get the "current" value of the instruction pointer being executed
/// right now.
macro_rules! next_bytecode {
    ($self: ident, $chunk: ident) => {{
        let byte = $chunk.get($self.ip);
        $self.ip += 1;
        byte
    }};
}

/// Gets the value of the current instruction pointer. To be used in conjunction with
/// [next_bytecode].
macro_rules! current_ip {
    ($self: ident) => {
        $self.ip - 1
    };
}

impl VM {
    pub fn new() -> VM {
        VM::default()
    }

    /// Interpret some Lox bytecode, writing any `print`ed output to `out`.
    pub fn interpret(&mut self, source: &str, out: &mut dyn Write) -> crate::Result<()> {
        let chunk = compiler::compile(source)?;
        let mut vm = VmWithChunk {
            ip: 0,
            stack: Vec::with_capacity(STACK_SIZE),
            chunk: &chunk,
            globals: &mut self.globals,
            out,
        };
        vm.run()
    }
}

impl<'a, 'out> VmWithChunk<'a, 'out> {
    /// The main opcode interpreter loop.
    fn run(&mut self) -> crate::Result<()> {
        use OpCode::*;
        let chunk = self.chunk;

        log::debug!("VM dispatch loop entry: {} bytes to run", chunk.len());

        loop {
            if cfg!(feature = "trace_execution") {
                use crate::debug::disassemble_instruction;

                // Prints the current stack:
                print!("        ");
                for value in self.stack.iter() {
                    print!("[ {value} ]")
                }
                println!();

                // Print the next instruction:
                disassemble_instruction(chunk, self.ip);
            }

            let opcode = next_bytecode!(self, chunk)
                .expect("I have an instruction pointer within range")
                .as_opcode();

            match opcode {
                Some(Constant) => {
                    let constant = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .resolve_constant()
                        .expect("there should be a constant at this index");
                    self.push(constant);
                }
                Some(Nil) => self.push(Value::Nil),
                Some(True) => self.push(true.into()),
                Some(False) => self.push(false.into()),
                Some(Pop) => {
                    self.pop();
                }
                Some(GetLocal) => {
                    let slot = self.read_byte_operand();
                    self.push(self.stack[slot].clone());
                }
                Some(SetLocal) => {
                    let slot = self.read_byte_operand();
                    self.stack[slot] = self.peek(0).clone();
                }
                Some(GetGlobal) => {
                    let name = self.read_string_constant();
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value);
                        }
                        None => {
                            let message = format!("Undefined variable '{name}'.");
                            return self.runtime_error(&message);
                        }
                    }
                }
                Some(SetGlobal) => {
                    let name = self.read_string_constant();
                    if !self.globals.contains_key(&name) {
                        let message = format!("Undefined variable '{name}'.");
                        return self.runtime_error(&message);
                    }
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                }
                Some(DefineGlobal) => {
                    let name = self.read_string_constant();
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                Some(Equal) => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    self.push(lhs.lox_equal(&rhs).into());
                }
                Some(Greater) => self.binary_cmp_op(|a, b| a > b)?,
                Some(Less) => self.binary_cmp_op(|a, b| a < b)?,
                Some(Add) => self.add()?,
                Some(Subtract) => self.binary_arith_op(|a, b| a - b)?,
                Some(Multiply) => self.binary_arith_op(|a, b| a * b)?,
                Some(Divide) => self.binary_arith_op(|a, b| a / b)?,
                Some(Not) => {
                    let value = self.pop();
                    self.push(value.is_falsy().into());
                }
                Some(Negate) => {
                    if let Value::Number(number) = self.peek(0) {
                        let number = *number;
                        self.pop();
                        self.push((-number).into());
                    } else {
                        return self.runtime_error("Operand must be a number.");
                    }
                }
                Some(Print) => {
                    let value = self.pop();
                    writeln!(self.out, "{value}").expect("write to output sink");
                }
                Some(Jump) => {
                    let offset = self.read_u16_operand();
                    self.ip += offset as usize;
                }
                Some(JumpIfFalse) => {
                    let offset = self.read_u16_operand();
                    if self.peek(0).is_falsy() {
                        self.ip += offset as usize;
                    }
                }
                Some(Loop) => {
                    let offset = self.read_u16_operand();
                    self.ip -= offset as usize;
                }
                Some(Return) => {
                    return Ok(());
                }
                None => panic!("fetched invalid opcode at {}", current_ip!(self)),
            }
        }
    }

    fn read_byte_operand(&mut self) -> usize {
        let chunk = self.chunk;
        next_bytecode!(self, chunk)
            .expect("there should be an operand")
            .as_constant_index()
    }

    fn read_string_constant(&mut self) -> Rc<str> {
        let chunk = self.chunk;
        let value = next_bytecode!(self, chunk)
            .expect("there should be an operand")
            .resolve_constant()
            .expect("there should be a constant at this index");
        match value {
            Value::Str(name) => name,
            _ => unreachable!("compiler only ever emits string constants for variable names"),
        }
    }

    fn read_u16_operand(&mut self) -> u16 {
        let chunk = self.chunk;
        let lo = next_bytecode!(self, chunk)
            .expect("there should be an operand")
            .as_constant_index() as u16;
        let hi = next_bytecode!(self, chunk)
            .expect("there should be an operand")
            .as_constant_index() as u16;
        lo | (hi << 8)
    }

    fn runtime_error<T>(&mut self, message: &str) -> crate::Result<T> {
        let line = self
            .chunk
            .line_number_for(current_ip!(self))
            .unwrap_or_default();
        self.reset_stack();

        Err(InterpretationError::RuntimeError(RuntimeError::new(
            message.to_string(),
            line,
        )))
    }

    /// `+` is overloaded for numbers and strings; every other arithmetic operator
    /// only accepts numbers.
    fn add(&mut self) -> crate::Result<()> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(_), Value::Number(_)) => self.binary_arith_op(|a, b| a + b),
            (Value::Str(_), Value::Str(_)) => {
                let rhs = self.pop();
                let lhs = self.pop();
                let (Value::Str(a), Value::Str(b)) = (lhs, rhs) else {
                    unreachable!()
                };
                self.push(Value::Str(Rc::from(format!("{a}{b}"))));
                Ok(())
            }
            (_, _) => self.runtime_error("Operands must be two numbers or two strings."),
        }
    }

    /// Pops two operands, applying a numeric operator and pushing a numeric result.
    fn binary_arith_op<F>(&mut self, op: F) -> crate::Result<()>
    where
        F: Fn(f64, f64) -> f64,
    {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return self.runtime_error("Operands must be numbers.");
        };
        let result = op(*a, *b);
        self.pop();
        self.pop();
        self.push(result.into());
        Ok(())
    }

    /// Pops two operands, applying a comparison and pushing a boolean result.
    fn binary_cmp_op<F>(&mut self, op: F) -> crate::Result<()>
    where
        F: Fn(f64, f64) -> bool,
    {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return self.runtime_error("Operands must be numbers.");
        };
        let result = op(*a, *b);
        self.pop();
        self.pop();
        self.push(result.into());
        Ok(())
    }

    /// Pushes a [Value] on to the value stack.
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops and returns the top [Value] on the value stack.
    ///
    /// # Panics
    ///
    /// Panics when the value stack is empty. Given well-formed Lox bytecode, a pop cannot occur
    /// when the value stack is empty; therefore the interpreter panics if it is in this state.
    #[inline(always)]
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack is empty")
    }

    /// Peeks at the value relative to the top of the stack.
    ///
    /// # Panics
    ///
    ///  * When the stack is empty
    ///  * When the distance goes off the end of the stack
    #[inline(always)]
    fn peek(&self, distance: usize) -> &Value {
        self.stack
            .get(self.stack.len() - 1 - distance)
            .expect("peeked escaped bounds of the stack")
    }

    #[inline(always)]
    fn reset_stack(&mut self) {
        self.stack.clear()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(source: &str) -> Result<String, InterpretationError> {
        let mut vm = VM::new();
        let mut out = Vec::new();
        vm.interpret(source, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!("7\n", run("print 1 + 2 * 3;").unwrap());
    }

    #[test]
    fn string_concatenation() {
        assert_eq!("helloworld\n", run(r#"print "hello" + "world";"#).unwrap());
    }

    #[test]
    fn globals_persist_across_statements() {
        assert_eq!("3\n", run("var a = 1; var b = 2; print a + b;").unwrap());
    }

    #[test]
    fn locals_shadow_globals_in_block_scope() {
        let src = "var a = \"global\"; { var a = \"local\"; print a; } print a;";
        assert_eq!("local\nglobal\n", run(src).unwrap());
    }

    #[test]
    fn if_else_branches() {
        assert_eq!("yes\n", run("if (1 < 2) print \"yes\"; else print \"no\";").unwrap());
        assert_eq!("no\n", run("if (1 > 2) print \"yes\"; else print \"no\";").unwrap());
    }

    #[test]
    fn while_loop_counts_up() {
        let src = "var i = 0; while (i < 3) { print i; i = i + 1; }";
        assert_eq!("0\n1\n2\n", run(src).unwrap());
    }

    #[test]
    fn for_loop_desugars_correctly() {
        let src = "for (var i = 0; i < 3; i = i + 1) print i;";
        assert_eq!("0\n1\n2\n", run(src).unwrap());
    }

    #[test]
    fn or_short_circuits_on_truthy_left() {
        let src = "var ran = false; true or (ran = true); print ran;";
        assert_eq!("false\n", run(src).unwrap());
    }

    #[test]
    fn and_short_circuits_on_falsy_left() {
        let src = "var ran = false; false and (ran = true); print ran;";
        assert_eq!("false\n", run(src).unwrap());
    }

    #[test]
    fn undefined_variable_is_a_runtime_error() {
        let err = run("print nope;").unwrap_err();
        assert!(matches!(err, InterpretationError::RuntimeError(_)));
    }

    #[test]
    fn adding_number_to_string_is_a_runtime_error() {
        let err = run(r#"print 1 + "two";"#).unwrap_err();
        assert!(matches!(err, InterpretationError::RuntimeError(_)));
    }
}
