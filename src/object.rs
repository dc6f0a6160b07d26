use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Formatter;
use std::fs;
use std::hash::Hasher;
use std::io::{BufRead, BufReader};
use std::rc::Rc;

use fnv::FnvHasher;

use crate::ast::Statement;
use crate::builtin::BuiltinFunction;
use crate::code::Instructions;
use crate::environment::Environment;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub enum ObjectType {
    Integer,
    String,
    Boolean,
    Null,
    ReturnValue,
    Error,
    Function,
    Builtin,
    Array,
    Hash,
    CompiledFunction,
    File,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}",
            match self {
                ObjectType::Integer => "INTEGER",
                ObjectType::String => "STRING",
                ObjectType::Boolean => "BOOLEAN",
                ObjectType::Null => "NULL",
                ObjectType::ReturnValue => "RETURN_VALUE",
                ObjectType::Error => "ERROR",
                ObjectType::Function => "FUNCTION",
                ObjectType::Builtin => "BUILTIN",
                ObjectType::Array => "ARRAY",
                ObjectType::Hash => "HASH",
                ObjectType::CompiledFunction => "COMPILED_FUNCTION_OBJ",
                ObjectType::File => "FILE",
            }
        )
    }
}

// Canonical key for hash pairs: the type tag plus a 64-bit digest.
// Integers digest to their value, booleans to 1/0, strings to FNV-1a
// over their bytes. Everything else is not hashable.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub struct HashKey {
    pub object_type: ObjectType,
    pub value: u64,
}

impl HashKey {
    pub fn from_object(obj: &Object) -> Option<Self> {
        match obj {
            Object::Integer(i) => Some(HashKey {
                object_type: ObjectType::Integer,
                value: *i as u64,
            }),
            Object::Boolean(b) => Some(HashKey {
                object_type: ObjectType::Boolean,
                value: if *b { 1 } else { 0 },
            }),
            Object::String(st) => {
                let mut hasher = FnvHasher::default();
                hasher.write(st.as_bytes());
                Some(HashKey {
                    object_type: ObjectType::String,
                    value: hasher.finish(),
                })
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

// A host file opened by the `open` builtin. The reader lives behind a
// RefCell so `read`/`lines`/`close` can advance or drop it through the
// shared Rc handle.
#[derive(Debug)]
pub struct FileHandle {
    path: String,
    reader: RefCell<Option<BufReader<fs::File>>>,
}

impl FileHandle {
    pub fn open(path: &str) -> Self {
        let reader = fs::File::open(path).ok().map(BufReader::new);
        FileHandle {
            path: path.to_string(),
            reader: RefCell::new(reader),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    // Next line including its newline, or "" at EOF and on closed handles.
    pub fn read_line(&self) -> String {
        let mut reader = self.reader.borrow_mut();
        let reader = match reader.as_mut() {
            None => return String::new(),
            Some(r) => r,
        };

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => String::new(),
            Ok(_) => line,
        }
    }

    // All remaining lines, without their line endings.
    pub fn read_lines(&self) -> Vec<String> {
        let mut reader = self.reader.borrow_mut();
        let reader = match reader.as_mut() {
            None => return Vec::new(),
            Some(r) => r,
        };

        let mut lines = Vec::new();
        let mut line = String::new();
        loop {
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line.ends_with('\n') {
                        line.pop();
                        if line.ends_with('\r') {
                            line.pop();
                        }
                    }
                    lines.push(line.clone());
                    line.clear();
                }
            }
        }
        lines
    }

    pub fn close(&self) {
        self.reader.borrow_mut().take();
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Integer(i64),
    String(String),
    Boolean(bool),
    Null,
    ReturnValue(Box<Object>),
    Error(String),
    Function{
        parameters: Vec<String>,
        body: Statement,
        env: Environment,
    },
    Builtin(BuiltinFunction),
    Array(Rc<RefCell<Vec<Object>>>),
    Hash(BTreeMap<HashKey, HashPair>),
    CompiledFunction(Rc<CompiledFunction>),
    File(Rc<FileHandle>),
}

impl Object {
    pub const TRUE: Object = Object::Boolean(true);
    pub const FALSE: Object = Object::Boolean(false);
    pub const NULL: Object = Object::Null;

    pub fn array(elements: Vec<Object>) -> Object {
        Object::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Integer(_) => ObjectType::Integer,
            Object::String(_) => ObjectType::String,
            Object::Boolean(_) => ObjectType::Boolean,
            Object::Null => ObjectType::Null,
            Object::ReturnValue(_) => ObjectType::ReturnValue,
            Object::Error(_) => ObjectType::Error,
            Object::Function{..} => ObjectType::Function,
            Object::Builtin(_) => ObjectType::Builtin,
            Object::Array(_) => ObjectType::Array,
            Object::Hash(_) => ObjectType::Hash,
            Object::CompiledFunction(_) => ObjectType::CompiledFunction,
            Object::File(_) => ObjectType::File,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Object::Integer(i) => format!("{}", i),
            Object::String(s) => s.to_string(),
            Object::Boolean(b) => format!("{}", b),
            Object::Null => "null".to_string(),
            Object::ReturnValue(obj) => format!("{}", obj),
            Object::Error(msg) => format!("ERROR: {}", msg),
            Object::Function { parameters, body, .. } => format!("fn ({}) {{ {} }}",
                                                                 parameters.join(", "), body),
            Object::Builtin(_) => "builtin function".to_string(),
            Object::Array(arr) => format!("[{}]",
                    arr.borrow().iter().map(|p| format!("{}", p)).collect::<Vec<_>>().join(", ")),
            Object::Hash(hash) => format!("{{{}}}",
                    hash.iter().map(|(_, kv)| format!("{}: {}", kv.key, kv.value)).collect::<Vec<_>>().join(", ")),
            Object::CompiledFunction(cf) => format!("CompiledFunction[{:p}]", Rc::as_ptr(cf)),
            Object::File(file) => format!("<file:{}>", file.path()),
        };
        write!(f, "{}", msg)
    }
}
