use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use crate::ast::{Expression, Node, Program, Statement};
use crate::builtin::BuiltinFunction;
use crate::object::{HashKey, HashPair, Object};
use crate::environment::Environment;

// The tree-walking back-end. The bytecode VM is the primary engine; this
// one walks the AST directly and doubles as an oracle for differential
// tests against the compiler/VM pipeline.
#[derive(Clone, PartialEq)]
pub struct Evaluator {
    env: Rc<RefCell<Environment>>
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            env: Rc::new(RefCell::new(Environment::new()))
        }
    }

    pub fn from(env: Environment) -> Self {
        Self {
            env: Rc::new(RefCell::new(env))
        }
    }

    pub fn get(&self, key: &str) -> Option<Object> {
        self.env.borrow().get(key)
    }

    fn set(&mut self, key: String, value: Object) {
        self.env.borrow_mut().set(key, value)
    }

    pub fn eval(&mut self, node: Node) -> Option<Object> {
        match node {
            Node::Program(program) => self.eval_program(program),
            Node::Statement(stmt) => match stmt {
                Statement::BlockStatement(b) => self.eval_block_statement(b),
                Statement::ExpressionStatement(exp) => self.eval(Node::Expression(exp)),
                Statement::ReturnStatement(r) => {
                    let val = self.eval(Node::Expression(r))?;
                    if is_error(&val) {
                        return Some(val);
                    }
                    Some(Object::ReturnValue(Box::new(val)))
                }
                Statement::LetStatement {name, value} => {
                    let val = self.eval(Node::Expression(value))?;
                    if is_error(&val) {
                        return Some(val);
                    }
                    self.set(name, val.clone());
                    Some(val)
                }
            },
            Node::Expression(exp) => match exp {
                Expression::Integer(i) => Some(Object::Integer(i)),
                Expression::String(s) => Some(Object::String(s)),
                Expression::Boolean(b) => Some(Object::Boolean(b)),
                Expression::PrefixExpression {operator, right} => {
                    let right = self.eval(Node::Expression(*right))?;
                    if is_error(&right) {
                        return Some(right);
                    }
                    Some(eval_prefix_expression(operator, right))
                },
                Expression::InfixExpression {operator, left, right} => {
                    let left = self.eval(Node::Expression(*left))?;
                    if is_error(&left) {
                        return Some(left)
                    }
                    let right = self.eval(Node::Expression(*right))?;
                    if is_error(&right) {
                        return Some(right)
                    }
                    Some(eval_infix_expression(operator, left, right))
                },
                Expression::IfExpression{..} => self.eval_if_expression(exp),
                Expression::Identifier(s) => self.eval_identifier(s),
                Expression::Function {name: _, parameters, body} => {
                    let env = Rc::clone(&self.env);
                    Some(Object::Function {
                        parameters,
                        body: *body,
                        env: Environment::new_enclosed(env),
                    })
                },
                Expression::CallExpression {function, arguments} => {
                    let function = self.eval(Node::Expression(*function))?;
                    if is_error(&function) {
                        return Some(function);
                    }
                    let args = self.eval_expressions(arguments)?;
                    if args.len() == 1 && is_error(&args[0]) {
                        return Some(args[0].clone());
                    }
                    apply_function(function, args)
                },
                Expression::Array(exps) => {
                    let elements = self.eval_expressions(exps)?;
                    if elements.len() == 1 && is_error(&elements[0]) {
                        return Some(elements[0].clone());
                    }
                    Some(Object::array(elements))
                },
                Expression::IndexExpression {left, index} => {
                    let left = self.eval(Node::Expression(*left))?;
                    if is_error(&left) {
                        return Some(left);
                    }
                    let index = self.eval(Node::Expression(*index))?;
                    if is_error(&index) {
                        return Some(index);
                    }
                    Some(eval_index_expression(left, index))
                },
                Expression::Hash(pairs) => {
                    self.eval_hash_literal(pairs)
                },
                Expression::AssignExpression {name, value} => {
                    let val = self.eval(Node::Expression(*value))?;
                    if is_error(&val) {
                        return Some(val);
                    }
                    // rebinds in the owning scope, like the compiled
                    // back-end's resolve-then-store
                    if !self.env.borrow_mut().assign(&name, val.clone()) {
                        return Some(new_error(format!("identifier {} not found", name)));
                    }
                    Some(val)
                },
                Expression::UseExpression {value: _, body} => {
                    // the embedded program runs in the surrounding
                    // environment and the literal itself is null
                    for stmt in body.statements {
                        let result = self.eval(Node::Statement(stmt))?;
                        match result {
                            Object::ReturnValue(_) | Object::Error(_) => {
                                return Some(result);
                            },
                            _ => {},
                        }
                    }
                    Some(Object::Null)
                },
            },
        }
    }

    fn eval_program(&mut self, program: Program) -> Option<Object>{
        let mut result = Object::Null;

        for stmt in program.statements {
            result = self.eval(Node::Statement(stmt))?;

            match result {
                Object::ReturnValue(ret) => {
                    return Some(*ret);
                },
                Object::Error(err) => {
                    return Some(Object::Error(err));
                }
                _ => {}
            }
        }
        Some(result)
    }

    fn eval_block_statement(&mut self, block: Vec<Statement>) -> Option<Object>{
        let mut result = Object::Null;

        for stmt in block {
            result = self.eval(Node::Statement(stmt))?;

            match result {
                Object::ReturnValue(_) | Object::Error(_) => {
                    return Some(result);
                },
                _ => {},
            }
        }

        Some(result)
    }


    fn eval_if_expression(&mut self, expression: Expression) -> Option<Object> {
        if let Expression::IfExpression {condition, consequence, alternative} = expression {
            let condition = self.eval(Node::Expression(*condition))?;
            if is_error(&condition) {
                return Some(condition);
            }

            if is_truthy(&condition) {
                self.eval(Node::Statement(*consequence))
            } else {
                match alternative {
                    None => Some(Object::Null),
                    Some(st) => self.eval(Node::Statement(*st))
                }
            }
        } else {
            None
        }
    }

    fn eval_identifier(&mut self, identifier: String) -> Option<Object> {
        match self.get(&identifier) {
            Some(obj) => Some(obj.clone()),
            None => match BuiltinFunction::look_up(&identifier) {
                Some(builtin) => Some(Object::Builtin(builtin)),
                None => Some(new_error(format!("identifier {} not found", identifier)))
            }
        }
    }

    fn eval_expressions(&mut self, args: Vec<Expression>) -> Option<Vec<Object>> {
        let mut result = Vec::new();

        for arg in args {
            let evaluated = self.eval(Node::Expression(arg))?;
            if is_error(&evaluated) {
                return Some(vec![evaluated]);
            }
            result.push(evaluated);
        }
        Some(result)
    }

    fn eval_hash_literal(&mut self, pairs: Vec<(Expression, Expression)>) -> Option<Object> {
        let mut map = BTreeMap::<HashKey, HashPair>::new();
        for (key, value) in pairs {
            let key = self.eval(Node::Expression(key))?;
            if is_error(&key) {
                return Some(key);
            }

            let value = self.eval(Node::Expression(value))?;
            if is_error(&value) {
                return Some(value);
            }

            let hashed_key = match HashKey::from_object(&key) {
                Some(hk) => hk,
                None => return Some(new_error(format!("unusable as hash key: {}", key.object_type()))),
            };
            map.insert(hashed_key, HashPair{ key, value });
        }
        Some(Object::Hash(map))
    }

}

fn is_error(val: &Object) -> bool {
    if let Object::Error(_) = val {
        true
    } else {
        false
    }
}

pub fn new_error(msg: String) -> Object {
    Object::Error(msg)
}

fn native_bool_to_object(input: bool) -> Object {
    if input {
        Object::TRUE
    } else {
        Object::FALSE
    }
}

fn is_truthy(obj: &Object) -> bool {
    match obj {
        Object::Null => false,
        Object::Boolean(b) => *b,
        _ => true,
    }
}

fn eval_prefix_expression(operator: String, right: Object) -> Object {
    match operator.as_str() {
        "!" => eval_bang_expression(right),
        "-" => eval_minus_prefix_expression(right),
        _ => new_error(format!("unknown prefix operator: {}{}", operator, right)),
    }
}

fn eval_infix_expression(operator: String, left: Object, right: Object) -> Object {
    if let (Object::Integer(left), Object::Integer(right)) = (&left, &right) {
        eval_integer_infix_expression(operator, *left, *right)
    } else if let (Object::String(left), Object::String(right)) = (&left, &right) {
        eval_string_infix_expression(operator, left, right)
    } else {
        match operator.as_str() {
            "==" => native_bool_to_object(left == right),
            "!=" => native_bool_to_object(left != right),
            _ => new_error(format!("invalid operation: op {}, left {}, right {}", operator, left, right))
        }
    }
}

fn eval_bang_expression(right: Object) -> Object {
    match right {
        Object::Boolean(b) => Object::Boolean(!b),
        Object::Null => Object::Boolean(true),
        _ => Object::Boolean(false)
    }
}

fn eval_minus_prefix_expression(right: Object) -> Object {
    match right {
        Object::Integer(i) => Object::Integer(-i),
        _ => new_error(format!("unknown operator: -{}", right)),
    }
}

fn eval_integer_infix_expression(operator: String, left: i64, right: i64) -> Object {
    match operator.as_str() {
        "+" => Object::Integer(left + right),
        "-" => Object::Integer(left - right),
        "*" => Object::Integer(left * right),
        "/" => {
            if right == 0 {
                new_error("division by zero".to_string())
            } else {
                Object::Integer(left / right)
            }
        },
        "<" => Object::Boolean(left < right),
        ">" => Object::Boolean(left > right),
        "<=" => Object::Boolean(left <= right),
        ">=" => Object::Boolean(left >= right),
        "==" => Object::Boolean(left == right),
        "!=" => Object::Boolean(left != right),
        _ => new_error(format!("invalid operation: op {}, left {}, right {}", operator, left, right))
    }
}

fn eval_string_infix_expression(operator: String, left: &String, right: &String) -> Object {
    match operator.as_str() {
        "+" => Object::String(left.to_string() + right.as_str()),
        "==" => Object::Boolean(left == right),
        "!=" => Object::Boolean(left != right),
        _ => new_error(format!("invalid operation: op {}, left {}, right {}", operator, left, right))
    }
}

fn apply_function(function: Object, args: Vec<Object>) -> Option<Object> {
    match function {
        Object::Function {parameters, body, env} => {
            if parameters.len() != args.len() {
                return Some(new_error(format!("wrong number of arguments: want={}, got={}",
                                              parameters.len(), args.len())));
            }

            let mut eval = Evaluator::from(env);
            // argument expansion
            for (param, arg) in parameters.iter().zip(args) {
                eval.set(param.to_string(), arg);
            }

            match eval.eval(Node::Statement(body)) {
                None => None,
                Some(obj) => match obj {
                    Object::ReturnValue(exp) => {
                        Some(*exp)
                    },
                    other => Some(other)
                }
            }
        }
        Object::Builtin(bf) => {
            Some(bf.call(args))
        },
        _ => Some(new_error("calling non-function and non-built-in".to_string()))
    }
}

fn eval_index_expression(left: Object, index: Object) -> Object {
    match (&left, &index) {
        (Object::Array(arr), Object::Integer(i)) => {
            let elements = arr.borrow();
            if *i < 0 || *i >= elements.len() as i64 {
                Object::Null
            } else {
                elements[*i as usize].clone()
            }
        },
        (Object::Hash(pairs), _) => {
            match HashKey::from_object(&index) {
                None => new_error(format!("unusable as hash key: {}", index.object_type())),
                Some(key) => match pairs.get(&key) {
                    Some(pair) => pair.value.clone(),
                    None => Object::Null,
                }
            }
        },
        _ => new_error(format!("index operator not supported: {}", left.object_type())),
    }
}
