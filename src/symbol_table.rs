use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Formatter;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
}

impl fmt::Display for SymbolScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SymbolScope::Global => write!(f, "GLOBAL"),
            SymbolScope::Local => write!(f, "LOCAL"),
            SymbolScope::Builtin => write!(f, "BUILTIN"),
        }
    }
}

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

// A stack of scopes linked through `outer`, like the evaluator's
// environments. Resolution walks outward; the innermost hit wins.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    outer: Option<Rc<RefCell<SymbolTable>>>,
    store: BTreeMap<String, Symbol>,
    pub num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            outer: None,
            store: BTreeMap::new(),
            num_definitions: 0,
        }
    }

    pub fn new_enclosed(outer: Rc<RefCell<SymbolTable>>) -> Self {
        SymbolTable {
            outer: Some(outer),
            store: BTreeMap::new(),
            num_definitions: 0,
        }
    }

    pub fn outer(&self) -> Option<Rc<RefCell<SymbolTable>>> {
        self.outer.clone()
    }

    // Redefining a name in the same scope overwrites the stored symbol and
    // still burns a fresh index.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        match self.store.get(name) {
            Some(symbol) => Some(symbol.clone()),
            None => match &self.outer {
                Some(outer) => outer.borrow().resolve(name),
                None => None,
            },
        }
    }
}
