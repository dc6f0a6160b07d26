use std::collections::BTreeMap;
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::builtin::BuiltinFunction;
use crate::code::{Instructions, Operation};
use crate::compiler::ByteCode;
use crate::object::{CompiledFunction, HashKey, HashPair, Object};

pub const STACK_SIZE: usize = 2048;
pub const GLOBAL_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct RuntimeError(pub String);

// Per-call record: the running function, its instruction pointer and the
// stack index where its argument/local slots begin.
struct Frame {
    func: Rc<CompiledFunction>,
    ip: i64,
    base_pointer: usize,
}

impl Frame {
    fn new(func: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Frame {
            func,
            ip: -1,
            base_pointer,
        }
    }

    fn instructions(&self) -> &Instructions {
        &self.func.instructions
    }
}

pub struct VM {
    constants: Vec<Object>,

    stack: Vec<Object>,
    sp: usize, // points to the next free slot; top of stack is stack[sp-1]

    globals: Vec<Object>,

    frames: Vec<Frame>,
}

impl VM {
    pub fn new(byte_code: ByteCode) -> Self {
        Self::new_with_globals_store(byte_code, vec![Object::Null; GLOBAL_SIZE])
    }

    // The REPL hands the same globals back in on every prompt so that
    // bindings persist across compile/run cycles.
    pub fn new_with_globals_store(byte_code: ByteCode, globals: Vec<Object>) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: byte_code.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_frame = Frame::new(main_fn, 0);

        Self {
            constants: byte_code.constants,

            stack: vec![Object::Null; STACK_SIZE],
            sp: 0,

            globals,

            frames: vec![main_frame],
        }
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    // Valid because pops only move sp downwards without clearing the slot.
    pub fn last_popped_stack_elem(&self) -> Object {
        self.stack[self.sp].clone()
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() as i64 - 1 {
            self.current_frame_mut().ip += 1;

            let ip = self.current_frame().ip as usize;
            let op_byte = self.current_frame().instructions()[ip];
            let op = match Operation::from_byte(op_byte) {
                Some(op) => op,
                None => return Err(RuntimeError(format!("opcode {} is invalid: pos {}", op_byte, ip))),
            };

            match op {
                Operation::OpConstant => {
                    let const_idx = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let constant = self.constants[const_idx as usize].clone();
                    self.push(constant)?;
                },
                Operation::OpAdd | Operation::OpSub | Operation::OpMul | Operation::OpDiv => {
                    self.execute_binary_operation(op)?;
                },
                Operation::OpPop => {
                    self.pop()?;
                },
                Operation::OpTrue => {
                    self.push(Object::TRUE)?;
                },
                Operation::OpFalse => {
                    self.push(Object::FALSE)?;
                },
                Operation::OpEqual | Operation::OpNotEqual |
                    Operation::OpGreaterThan | Operation::OpGreaterThanOrEqual => {
                    self.execute_comparison(op)?;
                },
                Operation::OpMinus => {
                    self.execute_minus_operator()?;
                },
                Operation::OpBang => {
                    self.execute_bang_operator()?;
                },
                Operation::OpJump => {
                    let pos = self.read_u16_operand(ip);
                    self.current_frame_mut().ip = pos as i64 - 1;
                },
                Operation::OpJumpNotTruthy => {
                    let pos = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let condition = self.pop()?;
                    if !is_truthy(&condition) {
                        self.current_frame_mut().ip = pos as i64 - 1;
                    }
                },
                Operation::OpNull => {
                    self.push(Object::NULL)?;
                },
                Operation::OpSetGlobal => {
                    let global_idx = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let value = self.pop()?;
                    self.globals[global_idx as usize] = value;
                },
                Operation::OpGetGlobal => {
                    let global_idx = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    self.push(self.globals[global_idx as usize].clone())?;
                },
                Operation::OpArray => {
                    let num_elements = self.read_u16_operand(ip) as usize;
                    self.current_frame_mut().ip += 2;

                    let array = self.build_array(self.sp - num_elements, self.sp);
                    self.sp -= num_elements;
                    self.push(array)?;
                },
                Operation::OpHash => {
                    let num_elements = self.read_u16_operand(ip) as usize;
                    self.current_frame_mut().ip += 2;

                    let hash = self.build_hash(self.sp - num_elements, self.sp)?;
                    self.sp -= num_elements;
                    self.push(hash)?;
                },
                Operation::OpIndex => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                },
                Operation::OpCall => {
                    let num_args = self.read_u8_operand(ip);
                    self.current_frame_mut().ip += 1;

                    self.execute_call(num_args as usize)?;
                },
                Operation::OpReturnValue => {
                    let return_value = self.pop()?;

                    let frame = self.pop_frame()?;
                    if frame.base_pointer == 0 {
                        // only the top-level frame starts at 0
                        return Err(RuntimeError("return outside of a function".to_string()));
                    }
                    self.sp = frame.base_pointer - 1;

                    self.push(return_value)?;
                },
                Operation::OpReturn => {
                    let frame = self.pop_frame()?;
                    if frame.base_pointer == 0 {
                        return Err(RuntimeError("return outside of a function".to_string()));
                    }
                    self.sp = frame.base_pointer - 1;

                    self.push(Object::NULL)?;
                },
                Operation::OpGetLocal => {
                    let local_idx = self.read_u8_operand(ip) as usize;
                    self.current_frame_mut().ip += 1;

                    let base_pointer = self.current_frame().base_pointer;
                    self.push(self.stack[base_pointer + local_idx].clone())?;
                },
                Operation::OpSetLocal => {
                    let local_idx = self.read_u8_operand(ip) as usize;
                    self.current_frame_mut().ip += 1;

                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base_pointer + local_idx] = value;
                },
                Operation::OpGetBuiltin => {
                    let builtin_idx = self.read_u8_operand(ip) as usize;
                    self.current_frame_mut().ip += 1;

                    let builtin = match BuiltinFunction::by_index(builtin_idx) {
                        Some(builtin) => builtin,
                        None => return Err(RuntimeError(format!("undefined builtin index {}", builtin_idx))),
                    };
                    self.push(Object::Builtin(builtin))?;
                },
                Operation::OpClosure => {
                    // defined in the ISA but never emitted; executing one is a bug
                    return Err(RuntimeError(format!("unhandled opcode OpClosure at pos {}", ip)));
                },
            }
        }
        Ok(())
    }

    fn read_u16_operand(&self, ip: usize) -> u16 {
        BigEndian::read_u16(&self.current_frame().instructions()[(ip + 1)..(ip + 3)])
    }

    fn read_u8_operand(&self, ip: usize) -> u8 {
        self.current_frame().instructions()[ip + 1]
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let idx = self.frames.len() - 1;
        &mut self.frames[idx]
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError("frame overflow".to_string()));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Result<Frame, RuntimeError> {
        match self.frames.pop() {
            Some(frame) => Ok(frame),
            None => Err(RuntimeError("frame underflow".to_string())),
        }
    }

    fn push(&mut self, object: Object) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            Err(RuntimeError("stack overflow occurred".to_string()))
        } else {
            self.stack[self.sp] = object;
            self.sp += 1;
            Ok(())
        }
    }

    fn pop(&mut self) -> Result<Object, RuntimeError> {
        if self.sp == 0 {
            Err(RuntimeError("stack underflow".to_string()))
        } else {
            let o = self.stack[self.sp - 1].clone();
            self.sp -= 1;
            Ok(o)
        }
    }

    fn execute_binary_operation(&mut self, op: Operation) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Object::Integer(left), Object::Integer(right)) => {
                self.execute_binary_integer_operation(op, *left, *right)
            },
            (Object::String(left), Object::String(right)) => match op {
                Operation::OpAdd => self.push(Object::String(left.to_string() + right)),
                _ => Err(RuntimeError(format!("unknown operator: {} (STRING STRING)", op))),
            },
            _ => Err(RuntimeError(format!("unsupported types for binary operation: {} {}",
                                          left.object_type(), right.object_type()))),
        }
    }

    fn execute_binary_integer_operation(&mut self, op: Operation, left: i64, right: i64) -> Result<(), RuntimeError> {
        let result = match op {
            Operation::OpAdd => left + right,
            Operation::OpSub => left - right,
            Operation::OpMul => left * right,
            Operation::OpDiv => {
                if right == 0 {
                    return Err(RuntimeError("division by zero".to_string()));
                }
                left / right
            },
            _ => return Err(RuntimeError(format!("unknown integer operator: {}", op))),
        };
        self.push(Object::Integer(result))
    }

    fn execute_comparison(&mut self, op: Operation) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Object::Integer(left), Object::Integer(right)) = (&left, &right) {
            let result = match op {
                Operation::OpEqual => left == right,
                Operation::OpNotEqual => left != right,
                Operation::OpGreaterThan => left > right,
                Operation::OpGreaterThanOrEqual => left >= right,
                _ => return Err(RuntimeError(format!("unknown integer operator: {}", op))),
            };
            return self.push(native_bool_to_boolean_object(result));
        }

        // only the canonical singletons are comparable here
        match op {
            Operation::OpEqual => self.push(native_bool_to_boolean_object(left == right)),
            Operation::OpNotEqual => self.push(native_bool_to_boolean_object(left != right)),
            _ => Err(RuntimeError(format!("unknown operator: {} ({} {})",
                                          op, left.object_type(), right.object_type()))),
        }
    }

    fn execute_bang_operator(&mut self) -> Result<(), RuntimeError> {
        let operand = self.pop()?;
        match operand {
            Object::Boolean(true) => self.push(Object::FALSE),
            Object::Boolean(false) => self.push(Object::TRUE),
            Object::Null => self.push(Object::TRUE),
            _ => self.push(Object::FALSE),
        }
    }

    fn execute_minus_operator(&mut self) -> Result<(), RuntimeError> {
        let operand = self.pop()?;
        match operand {
            Object::Integer(i) => self.push(Object::Integer(-i)),
            other => Err(RuntimeError(format!("unsupported type for negation: {}", other.object_type()))),
        }
    }

    fn build_array(&self, start: usize, end: usize) -> Object {
        Object::array(self.stack[start..end].to_vec())
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Object, RuntimeError> {
        let mut pairs = BTreeMap::new();

        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = match HashKey::from_object(&key) {
                Some(hash_key) => hash_key,
                None => return Err(RuntimeError(format!("unusable as hash key: {}", key.object_type()))),
            };
            pairs.insert(hash_key, HashPair { key, value });

            i += 2;
        }

        Ok(Object::Hash(pairs))
    }

    fn execute_index_expression(&mut self, left: Object, index: Object) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Object::Array(arr), Object::Integer(idx)) => {
                let elements = arr.borrow();
                let max = elements.len() as i64 - 1;
                if *idx < 0 || *idx > max {
                    self.push(Object::NULL)
                } else {
                    let element = elements[*idx as usize].clone();
                    drop(elements);
                    self.push(element)
                }
            },
            (Object::Hash(pairs), _) => {
                let key = match HashKey::from_object(&index) {
                    Some(key) => key,
                    None => return Err(RuntimeError(format!("unusable as hash key: {}", index.object_type()))),
                };
                match pairs.get(&key) {
                    Some(pair) => {
                        let value = pair.value.clone();
                        self.push(value)
                    },
                    None => self.push(Object::NULL),
                }
            },
            _ => Err(RuntimeError(format!("index operator not supported: {}", left.object_type()))),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Object::CompiledFunction(func) => self.call_function(func, num_args),
            Object::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RuntimeError("calling non-function and non-built-in".to_string())),
        }
    }

    fn call_function(&mut self, func: Rc<CompiledFunction>, num_args: usize) -> Result<(), RuntimeError> {
        if num_args != func.num_parameters {
            return Err(RuntimeError(format!("wrong number of arguments: want={}, got={}",
                                            func.num_parameters, num_args)));
        }

        let base_pointer = self.sp - num_args;
        let num_locals = func.num_locals;
        if base_pointer + num_locals > STACK_SIZE {
            return Err(RuntimeError("stack overflow occurred".to_string()));
        }

        self.push_frame(Frame::new(func, base_pointer))?;
        // local slots live above the arguments
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: BuiltinFunction, num_args: usize) -> Result<(), RuntimeError> {
        let args = self.stack[(self.sp - num_args)..self.sp].to_vec();

        // builtin failures come back as Error values, not VM errors
        let result = builtin.call(args);

        self.sp = self.sp - num_args - 1; // drops the arguments and the callee
        self.push(result)
    }
}

fn native_bool_to_boolean_object(input: bool) -> Object {
    if input {
        Object::TRUE
    } else {
        Object::FALSE
    }
}

fn is_truthy(obj: &Object) -> bool {
    match obj {
        Object::Boolean(b) => *b,
        Object::Null => false,
        _ => true,
    }
}
