use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use crate::object::Object;

// Lexical scope chain for the tree-walking back-end, the runtime twin of
// the compiler's symbol table: lookups walk outward and innermost wins,
// definitions land in the innermost scope, assignments update the scope
// that owns the name.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    store: BTreeMap<String, Object>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment { store: BTreeMap::new(), outer: None }
    }

    pub fn new_enclosed(outer: Rc<RefCell<Environment>>) -> Self {
        Environment { store: BTreeMap::new(), outer: Some(outer) }
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        if let Some(obj) = self.store.get(name) {
            return Some(obj.clone());
        }

        let mut scope = self.outer.clone();
        while let Some(env) = scope {
            let env = env.borrow();
            if let Some(obj) = env.store.get(name) {
                return Some(obj.clone());
            }
            scope = env.outer.clone();
        }
        None
    }

    // A fresh definition shadows any outer binding of the same name.
    pub fn set(&mut self, name: String, value: Object) {
        self.store.insert(name, value);
    }

    // Rebinds an existing name in whichever scope owns it; false when the
    // name is nowhere defined.
    pub fn assign(&mut self, name: &str, value: Object) -> bool {
        if let Some(slot) = self.store.get_mut(name) {
            *slot = value;
            return true;
        }

        let mut scope = self.outer.clone();
        while let Some(env) = scope {
            let mut env = env.borrow_mut();
            if let Some(slot) = env.store.get_mut(name) {
                *slot = value;
                return true;
            }
            scope = env.outer.clone();
        }
        false
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;
    use crate::environment::Environment;
    use crate::object::Object;

    #[test]
    fn test_get_walks_outward() {
        let mut global = Environment::new();
        global.set("a".to_string(), Object::Integer(1));

        let global = Rc::new(RefCell::new(global));
        let mut inner = Environment::new_enclosed(Rc::clone(&global));
        inner.set("b".to_string(), Object::Integer(2));

        assert_eq!(inner.get("a"), Some(Object::Integer(1)));
        assert_eq!(inner.get("b"), Some(Object::Integer(2)));
        assert_eq!(inner.get("c"), None);
        assert_eq!(global.borrow().get("b"), None);
    }

    #[test]
    fn test_set_shadows_outer_binding() {
        let mut global = Environment::new();
        global.set("a".to_string(), Object::Integer(1));

        let global = Rc::new(RefCell::new(global));
        let mut inner = Environment::new_enclosed(Rc::clone(&global));
        inner.set("a".to_string(), Object::Integer(99));

        assert_eq!(inner.get("a"), Some(Object::Integer(99)));
        assert_eq!(global.borrow().get("a"), Some(Object::Integer(1)));
    }

    #[test]
    fn test_assign_updates_owning_scope() {
        let mut global = Environment::new();
        global.set("a".to_string(), Object::Integer(1));

        let global = Rc::new(RefCell::new(global));
        let mut inner = Environment::new_enclosed(Rc::clone(&global));

        assert!(inner.assign("a", Object::Integer(2)));
        assert_eq!(global.borrow().get("a"), Some(Object::Integer(2)));
        assert_eq!(inner.get("a"), Some(Object::Integer(2)));

        assert!(!inner.assign("missing", Object::Integer(0)));
    }
}
