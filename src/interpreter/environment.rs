// File: src/interpreter/environment.rs
//
// Lexical scoping environment for variable management in the Refl interpreter.
// Implements a tree of scope frames where inner frames shadow outer ones.
//
// Frames are reference counted: blocks, calls and loop iterations each get
// a fresh child frame, and a closure keeps its defining frame alive for as
// long as the closure itself is reachable.

use super::value::Object;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

struct Scope {
    vars: RwLock<AHashMap<String, Object>>,
    parent: Option<Environment>,
    /// Root of the chain, fixed at construction. `None` on the root itself.
    global: Option<Environment>,
}

/// Variable storage using lexical scoping
///
/// # Examples
///
/// ```ignore
/// let globals = Environment::new();
/// globals.define("x", Object::Number(10.0));
///
/// let block = globals.child();
/// block.define("x", Object::Number(20.0));   // shadows outer x
/// assert_eq!(block.get("x"), Some(Object::Number(20.0)));
/// assert_eq!(globals.get("x"), Some(Object::Number(10.0)));
///
/// block.set("y", Object::Number(1.0));       // no frame defines y: implicit global
/// assert_eq!(globals.get("y"), Some(Object::Number(1.0)));
/// ```
#[derive(Clone)]
pub struct Environment(Arc<Scope>);

impl Environment {
    /// Create a new root (global) frame
    pub fn new() -> Self {
        Environment(Arc::new(Scope { vars: RwLock::new(AHashMap::new()), parent: None, global: None }))
    }

    /// Create a frame nested inside this one
    pub fn child(&self) -> Self {
        Environment(Arc::new(Scope {
            vars: RwLock::new(AHashMap::new()),
            parent: Some(self.clone()),
            global: Some(self.global()),
        }))
    }

    /// The root frame of this chain
    pub fn global(&self) -> Environment {
        match &self.0.global {
            Some(global) => global.clone(),
            None => self.clone(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.0.global.is_none()
    }

    /// Look a name up, walking from this frame outward
    pub fn get(&self, name: &str) -> Option<Object> {
        let mut scope: &Scope = &self.0;
        loop {
            if let Some(value) = scope.vars.read().get(name) {
                return Some(value.clone());
            }
            match &scope.parent {
                Some(parent) => scope = &parent.0,
                None => return None,
            }
        }
    }

    /// Bind a name in this frame, shadowing any outer binding
    pub fn define(&self, name: impl Into<String>, value: Object) {
        self.0.vars.write().insert(name.into(), value);
    }

    /// Update the nearest frame that defines `name`; otherwise create the
    /// binding in the global frame
    pub fn set(&self, name: &str, value: Object) {
        let mut scope: &Scope = &self.0;
        loop {
            {
                let mut vars = scope.vars.write();
                if let Some(slot) = vars.get_mut(name) {
                    *slot = value;
                    return;
                }
            }
            match &scope.parent {
                Some(parent) => scope = &parent.0,
                None => break,
            }
        }
        self.global().define(name, value);
    }

    /// Remove a binding from this frame only
    pub fn delete(&self, name: &str) -> bool {
        self.0.vars.write().remove(name).is_some()
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.0.vars.read().contains_key(name)
    }

    /// Every binding of the global frame, sorted by name
    pub fn global_bindings(&self) -> Vec<(String, Object)> {
        let global = self.global();
        let vars = global.0.vars.read();
        let mut bindings: Vec<(String, Object)> = vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    pub fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("bindings", &self.0.vars.read().len())
            .field("global", &self.is_global())
            .finish()
    }
}

/// Non-owning handle to a frame.
///
/// Backs the `$` view, which lives inside the very frame it observes.
#[derive(Clone)]
pub struct WeakEnvironment(Weak<Scope>);

impl WeakEnvironment {
    pub fn upgrade(&self) -> Option<Environment> {
        self.0.upgrade().map(Environment)
    }

    /// Read a global binding; nil when absent or when the frame is gone
    pub fn lookup(&self, name: &str) -> Object {
        self.upgrade().and_then(|env| env.global().get(name)).unwrap_or(Object::Nil)
    }

    pub fn bindings(&self) -> Vec<(String, Object)> {
        self.upgrade().map(|env| env.global_bindings()).unwrap_or_default()
    }

    pub fn ptr_eq(&self, other: &WeakEnvironment) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        self.0.as_ptr() as *const () as usize
    }
}
