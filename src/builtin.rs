use std::fmt;
use std::fmt::Formatter;
use std::process;
use std::rc::Rc;

use crate::evaluator::new_error;
use crate::object::{FileHandle, Object};

pub type BuiltinFn = fn(args: Vec<Object>) -> Object;

// The registry order is load-bearing: OpGetBuiltin operands index into it.
pub const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("len", builtin_len),
    ("first", builtin_first),
    ("last", builtin_last),
    ("rest", builtin_rest),
    ("init", builtin_init),
    ("push", builtin_push),
    ("puts", builtin_puts),
    ("open", builtin_open),
    ("read", builtin_read),
    ("lines", builtin_lines),
    ("close", builtin_close),
    ("set", builtin_set),
    ("int", builtin_int),
    ("exit", builtin_exit),
];

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinFunction {
    name: &'static str,
    func: BuiltinFn
}

impl fmt::Display for BuiltinFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl BuiltinFunction {
    pub fn look_up(name: &str) -> Option<Self> {
        BUILTINS.iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, func)| Self { name, func })
    }

    pub fn by_index(index: usize) -> Option<Self> {
        BUILTINS.get(index)
            .map(|&(name, func)| Self { name, func })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(&self, args: Vec<Object>) -> Object {
        (self.func)(args)
    }
}

fn check_arity(args: &[Object], want: usize) -> Option<Object> {
    if args.len() != want {
        Some(new_error(format!("wrong number of arguments. got={}, want={}", args.len(), want)))
    } else {
        None
    }
}

fn builtin_len(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::String(st) => Object::Integer(st.len() as i64),
        Object::Array(arr) => Object::Integer(arr.borrow().len() as i64),
        other => new_error(format!("argument to `len` not supported, got {}", other.object_type()))
    }
}

fn builtin_first(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::String(st) => match st.chars().next() {
            Some(ch) => Object::String(ch.to_string()),
            None => Object::NULL,
        },
        Object::Array(arr) => match arr.borrow().first() {
            Some(obj) => obj.clone(),
            None => Object::NULL,
        },
        other => new_error(format!("argument to `first` not supported, got {}", other.object_type()))
    }
}

fn builtin_last(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::String(st) => match st.chars().last() {
            Some(ch) => Object::String(ch.to_string()),
            None => Object::NULL,
        },
        Object::Array(arr) => match arr.borrow().last() {
            Some(obj) => obj.clone(),
            None => Object::NULL,
        },
        other => new_error(format!("argument to `last` not supported, got {}", other.object_type()))
    }
}

fn builtin_rest(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::String(st) => if st.is_empty() {
            Object::NULL
        } else {
            Object::String(st.chars().skip(1).collect())
        },
        Object::Array(arr) => {
            let elements = arr.borrow();
            if elements.is_empty() {
                Object::NULL
            } else {
                Object::array(elements[1..].to_vec())
            }
        },
        other => new_error(format!("argument to `rest` not supported, got {}", other.object_type()))
    }
}

fn builtin_init(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::String(st) => if st.is_empty() {
            Object::NULL
        } else {
            let last = st.chars().count() - 1;
            Object::String(st.chars().take(last).collect())
        },
        Object::Array(arr) => {
            let elements = arr.borrow();
            if elements.is_empty() {
                Object::NULL
            } else {
                Object::array(elements[..elements.len() - 1].to_vec())
            }
        },
        other => new_error(format!("argument to `init` not supported, got {}", other.object_type()))
    }
}

// push copies; set mutates. The asymmetry is inherited behavior.
fn builtin_push(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 2) {
        return err;
    }

    match &args[0] {
        Object::Array(arr) => {
            let mut elements = arr.borrow().clone();
            elements.push(args[1].clone());
            Object::array(elements)
        },
        other => new_error(format!("argument to `push` must be ARRAY, got {}", other.object_type()))
    }
}

fn builtin_puts(args: Vec<Object>) -> Object {
    for arg in args {
        println!("{}", arg);
    }
    Object::NULL
}

fn builtin_open(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::String(path) => Object::File(Rc::new(FileHandle::open(path))),
        other => new_error(format!("argument to `open` must be STRING, got {}", other.object_type()))
    }
}

fn builtin_read(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::File(file) => Object::String(file.read_line()),
        other => new_error(format!("argument to `read` must be FILE, got {}", other.object_type()))
    }
}

fn builtin_lines(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::File(file) => Object::array(
            file.read_lines().into_iter().map(Object::String).collect()
        ),
        other => new_error(format!("argument to `lines` must be FILE, got {}", other.object_type()))
    }
}

fn builtin_close(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::File(file) => {
            file.close();
            Object::TRUE
        },
        other => new_error(format!("argument to `close` must be FILE, got {}", other.object_type()))
    }
}

fn builtin_set(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 3) {
        return err;
    }

    let arr = match &args[0] {
        Object::Array(arr) => arr,
        other => return new_error(format!("argument to `set` must be ARRAY, got {}", other.object_type()))
    };
    let idx = match &args[1] {
        Object::Integer(i) => *i,
        other => return new_error(format!("index `set` into ARRAY must be INTEGER, got {}", other.object_type()))
    };

    {
        let mut elements = arr.borrow_mut();
        if idx < 0 || idx >= elements.len() as i64 {
            return new_error(format!("index {} out of range", idx));
        }
        elements[idx as usize] = args[2].clone();
    }

    args[0].clone()
}

fn builtin_int(args: Vec<Object>) -> Object {
    if let Some(err) = check_arity(&args, 1) {
        return err;
    }

    match &args[0] {
        Object::String(st) => match st.parse::<i64>() {
            Ok(i) => Object::Integer(i),
            Err(_) => new_error(format!("string is not an int, got {}", st)),
        },
        other => new_error(format!("argument to `int` must be STRING, got {}", other.object_type()))
    }
}

fn builtin_exit(_args: Vec<Object>) -> Object {
    process::exit(0);
}
