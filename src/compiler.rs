use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Expression, Node, Statement};
use crate::builtin::BUILTINS;
use crate::code::{Instructions, make, Operation};
use crate::object::{CompiledFunction, Object};
use crate::symbol_table::{Symbol, SymbolScope, SymbolTable};

#[derive(Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct CompileError(pub String);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct EmittedInstruction {
    opcode: Operation,
    position: usize,
}

// Each function literal compiles in its own scope; the scope at index 0
// collects the top-level instructions.
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

impl CompilationScope {
    fn new() -> Self {
        CompilationScope {
            instructions: Instructions::new(vec![]),
            last_instruction: None,
            previous_instruction: None,
        }
    }
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (i, (name, _)) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(i, name);
        }
        Self::new_with_state(Rc::new(RefCell::new(symbol_table)), vec![])
    }

    // The REPL threads its symbol table and constants through here so that
    // bindings survive across prompts.
    pub fn new_with_state(symbol_table: Rc<RefCell<SymbolTable>>, constants: Vec<Object>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::new()],
            scope_index: 0,
        }
    }

    pub fn compile(&mut self, node: Node) -> Result<(), CompileError> {
        match node {
            Node::Program(p) => {
                for s in p.statements {
                    self.compile(Node::Statement(s))?
                }
                Ok(())
            },
            Node::Statement(stmt) => match stmt {
                Statement::ExpressionStatement(exp) => {
                    self.compile(Node::Expression(exp))?;
                    self.emit(Operation::OpPop, vec![]);
                    Ok(())
                },
                Statement::BlockStatement(stmts) => {
                    for s in stmts {
                        self.compile(Node::Statement(s))?
                    }
                    Ok(())
                },
                Statement::LetStatement {name, value} => {
                    // the symbol exists before the value compiles, so a
                    // let-bound function can refer to itself
                    let symbol = self.symbol_table.borrow_mut().define(&name);
                    self.compile(Node::Expression(value))?;
                    match symbol.scope {
                        SymbolScope::Global => {
                            self.emit(Operation::OpSetGlobal, vec![symbol.index as i32]);
                        },
                        _ => {
                            self.emit(Operation::OpSetLocal, vec![symbol.index as i32]);
                        },
                    }
                    Ok(())
                },
                Statement::ReturnStatement(value) => {
                    self.compile(Node::Expression(value))?;
                    self.emit(Operation::OpReturnValue, vec![]);
                    Ok(())
                },
            }
            Node::Expression(exp) => match exp {
                Expression::InfixExpression {operator, left, right} => {
                    // the ISA only knows > and >=, so < and <= compile with
                    // their operands swapped
                    if operator == "<" || operator == "<=" {
                        self.compile(Node::Expression(*right))?;
                        self.compile(Node::Expression(*left))?;

                        if operator == "<" {
                            self.emit(Operation::OpGreaterThan, vec![]);
                        } else {
                            self.emit(Operation::OpGreaterThanOrEqual, vec![]);
                        }
                        return Ok(());
                    }

                    self.compile(Node::Expression(*left))?;
                    self.compile(Node::Expression(*right))?;

                    match operator.as_ref() {
                        "+" => {
                            self.emit(Operation::OpAdd, vec![]);
                        },
                        "-" => {
                            self.emit(Operation::OpSub, vec![]);
                        },
                        "*" => {
                            self.emit(Operation::OpMul, vec![]);
                        },
                        "/" => {
                            self.emit(Operation::OpDiv, vec![]);
                        },
                        ">" => {
                            self.emit(Operation::OpGreaterThan, vec![]);
                        },
                        ">=" => {
                            self.emit(Operation::OpGreaterThanOrEqual, vec![]);
                        },
                        "==" => {
                            self.emit(Operation::OpEqual, vec![]);
                        },
                        "!=" => {
                            self.emit(Operation::OpNotEqual, vec![]);
                        },
                        _ => return Err(CompileError(format!("unknown operator {}", operator)))
                    }
                    Ok(())
                },
                Expression::PrefixExpression {operator, right} => {
                    self.compile(Node::Expression(*right))?;

                    match operator.as_ref() {
                        "!" => {
                            self.emit(Operation::OpBang, vec![]);
                        },
                        "-" => {
                            self.emit(Operation::OpMinus, vec![]);
                        },
                        _ => return Err(CompileError(format!("unknown operator {}", operator))),
                    }
                    Ok(())
                }
                Expression::Integer(i) => {
                    let integer = Object::Integer(i);
                    let pos = self.add_constant(integer) as i32;
                    self.emit(Operation::OpConstant, vec![pos]);
                    Ok(())
                },
                Expression::String(st) => {
                    let string = Object::String(st);
                    let pos = self.add_constant(string) as i32;
                    self.emit(Operation::OpConstant, vec![pos]);
                    Ok(())
                },
                Expression::Boolean(b) => {
                    if b {
                        self.emit(Operation::OpTrue, vec![]);
                    } else {
                        self.emit(Operation::OpFalse, vec![]);
                    }
                    Ok(())
                },
                Expression::Identifier(name) => {
                    let symbol = self.symbol_table.borrow().resolve(&name);
                    match symbol {
                        Some(symbol) => {
                            self.load_symbol(&symbol);
                            Ok(())
                        },
                        None => Err(CompileError(format!("undefined variable {}", name))),
                    }
                },
                Expression::IfExpression {condition, consequence, alternative} => {
                    self.compile(Node::Expression(*condition))?;

                    // placeholder target, patched once the consequence is layed out
                    let jump_not_truthy_pos = self.emit(Operation::OpJumpNotTruthy, vec![9999]);

                    self.compile(Node::Statement(*consequence))?;
                    if self.last_instruction_is(Operation::OpPop) {
                        self.remove_last_pop();
                    }

                    let jump_pos = self.emit(Operation::OpJump, vec![9999]);

                    let after_consequence = self.current_instructions().len();
                    self.change_operand(jump_not_truthy_pos, after_consequence as i32)?;

                    match alternative {
                        None => {
                            self.emit(Operation::OpNull, vec![]);
                        },
                        Some(alt) => {
                            self.compile(Node::Statement(*alt))?;
                            if self.last_instruction_is(Operation::OpPop) {
                                self.remove_last_pop();
                            }
                        }
                    }

                    let after_alternative = self.current_instructions().len();
                    self.change_operand(jump_pos, after_alternative as i32)?;
                    Ok(())
                },
                Expression::Function {name: _, parameters, body} => {
                    self.enter_scope();

                    let num_parameters = parameters.len();
                    for param in &parameters {
                        self.symbol_table.borrow_mut().define(param);
                    }

                    self.compile(Node::Statement(*body))?;

                    if self.last_instruction_is(Operation::OpPop) {
                        self.replace_last_pop_with_return();
                    }
                    if !self.last_instruction_is(Operation::OpReturnValue) {
                        self.emit(Operation::OpReturn, vec![]);
                    }

                    let num_locals = self.symbol_table.borrow().num_definitions;
                    let instructions = self.leave_scope();

                    let compiled = Object::CompiledFunction(Rc::new(CompiledFunction {
                        instructions,
                        num_locals,
                        num_parameters,
                    }));
                    let pos = self.add_constant(compiled) as i32;
                    self.emit(Operation::OpConstant, vec![pos]);
                    Ok(())
                },
                Expression::CallExpression {function, arguments} => {
                    self.compile(Node::Expression(*function))?;

                    let num_args = arguments.len();
                    for arg in arguments {
                        self.compile(Node::Expression(arg))?;
                    }

                    self.emit(Operation::OpCall, vec![num_args as i32]);
                    Ok(())
                },
                Expression::Array(exps) => {
                    let n = exps.len();
                    for exp in exps {
                        self.compile(Node::Expression(exp))?;
                    }
                    self.emit(Operation::OpArray, vec![n as i32]);
                    Ok(())
                },
                Expression::Hash(pairs) => {
                    // key order in the bytecode is deterministic regardless
                    // of source order
                    let mut pairs = pairs;
                    pairs.sort_by_key(|(key, _)| format!("{}", key));

                    let n = pairs.len();
                    for (key, value) in pairs {
                        self.compile(Node::Expression(key))?;
                        self.compile(Node::Expression(value))?;
                    }
                    self.emit(Operation::OpHash, vec![(n * 2) as i32]);
                    Ok(())
                },
                Expression::IndexExpression {left, index} => {
                    self.compile(Node::Expression(*left))?;
                    self.compile(Node::Expression(*index))?;
                    self.emit(Operation::OpIndex, vec![]);
                    Ok(())
                },
                Expression::AssignExpression {name, value} => {
                    let symbol = self.symbol_table.borrow().resolve(&name);
                    let symbol = match symbol {
                        Some(symbol) => symbol,
                        None => return Err(CompileError(format!("undefined variable {}", name))),
                    };

                    self.compile(Node::Expression(*value))?;

                    // store, then load again: the assignment is an
                    // expression and leaves the assigned value behind
                    match symbol.scope {
                        SymbolScope::Global => {
                            self.emit(Operation::OpSetGlobal, vec![symbol.index as i32]);
                            self.emit(Operation::OpGetGlobal, vec![symbol.index as i32]);
                        },
                        SymbolScope::Local => {
                            self.emit(Operation::OpSetLocal, vec![symbol.index as i32]);
                            self.emit(Operation::OpGetLocal, vec![symbol.index as i32]);
                        },
                        SymbolScope::Builtin => {
                            return Err(CompileError(format!("cannot assign to builtin {}", name)));
                        },
                    }
                    Ok(())
                },
                Expression::UseExpression {value: _, body} => {
                    // the embedded program compiles straight into the
                    // enclosing scope; the literal itself evaluates to null
                    for stmt in body.statements {
                        self.compile(Node::Statement(stmt))?;
                    }
                    self.emit(Operation::OpNull, vec![]);
                    Ok(())
                },
            },
        }
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1 // returns the object's index
    }

    fn emit(&mut self, op: Operation, operands: Vec<i32>) -> usize {
        let ins = make(op.as_byte(), &operands).expect("make instruction is failed");
        let pos = self.add_instruction(ins);
        self.set_last_instruction(op, pos);
        pos
    }

    fn add_instruction(&mut self, mut ins: Vec<u8>) -> usize {
        let pos_new_instruction = self.current_instructions().len();
        self.scopes[self.scope_index].instructions.append_vec(&mut ins);
        pos_new_instruction
    }

    fn set_last_instruction(&mut self, op: Operation, pos: usize) {
        let scope = &mut self.scopes[self.scope_index];
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position: pos,
        });
    }

    fn last_instruction_is(&self, op: Operation) -> bool {
        match self.scopes[self.scope_index].last_instruction {
            Some(last) => last.opcode == op,
            None => false,
        }
    }

    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_instruction(&mut self, pos: usize, new_instruction: Vec<u8>) {
        let instructions = &mut self.scopes[self.scope_index].instructions;
        for (i, byte) in new_instruction.into_iter().enumerate() {
            instructions[pos + i] = byte;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.scopes[self.scope_index].last_instruction {
            let new_instruction = make(Operation::OpReturnValue.as_byte(), &vec![])
                .expect("make instruction is failed");
            self.replace_instruction(last.position, new_instruction);
            self.scopes[self.scope_index].last_instruction = Some(EmittedInstruction {
                opcode: Operation::OpReturnValue,
                position: last.position,
            });
        }
    }

    // rewrites the operand of an already emitted instruction in place
    fn change_operand(&mut self, op_pos: usize, operand: i32) -> Result<(), CompileError> {
        let op = Operation::from_byte(self.current_instructions()[op_pos])
            .ok_or_else(|| CompileError(format!("invalid opcode at position {}", op_pos)))?;
        let new_instruction = make(op.as_byte(), &vec![operand])
            .ok_or_else(|| CompileError("make instruction is failed".to_string()))?;
        self.replace_instruction(op_pos, new_instruction);
        Ok(())
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        self.scope_index += 1;

        let enclosed = SymbolTable::new_enclosed(Rc::clone(&self.symbol_table));
        self.symbol_table = Rc::new(RefCell::new(enclosed));
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("no compilation scope to leave");
        self.scope_index -= 1;

        let outer = self.symbol_table.borrow().outer().expect("left the global scope");
        self.symbol_table = outer;

        scope.instructions
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => {
                self.emit(Operation::OpGetGlobal, vec![symbol.index as i32]);
            },
            SymbolScope::Local => {
                self.emit(Operation::OpGetLocal, vec![symbol.index as i32]);
            },
            SymbolScope::Builtin => {
                self.emit(Operation::OpGetBuiltin, vec![symbol.index as i32]);
            },
        }
    }

    pub fn byte_code(mut self) -> ByteCode {
        ByteCode {
            instructions: self.scopes.remove(0).instructions,
            constants: self.constants,
        }
    }
}


pub struct ByteCode {
    pub instructions: Instructions,
    pub constants: Vec<Object>
}
