// File: src/interpreter/value.rs
//
// Runtime value types for the Refl language.
// Defines every value that scripts can hold and the contracts each one
// satisfies: display form, truthiness, equality, hash identity, language
// level cloning, indexing and iteration.
//
// `Object` is a cheap handle. Cloning it with `Clone` aliases the same
// table/function/promise; the language's own copy operation is
// `Object::clone_value`.

use super::environment::{Environment, WeakEnvironment};
use super::promise::Promise;
use super::table::Table;
use super::Interpreter;
use crate::ast::BlockRef;
use crate::errors::{ErrorKind, Panic};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host function signature: every builtin is registered with this shape
pub type NativeFn = dyn Fn(&Interpreter, Vec<Object>) -> Result<Object, Panic> + Send + Sync;

/// Consumer side of an iteration: receives `(key, value)` and answers
/// whether it wants more pairs
pub type Sink<'a> = &'a mut dyn FnMut(Object, Object) -> Result<bool, Panic>;

/// Producer side of an iterator value
pub type Producer = dyn Fn(Sink<'_>) -> Result<(), Panic> + Send + Sync;

/// A user-defined closure
pub struct FunctionObject {
    pub params: Vec<String>,
    pub body: BlockRef,
    /// Child of the scope the literal was evaluated in
    pub env: Environment,
}

/// A builtin backed by host code
pub struct NativeFunction {
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Interpreter, Vec<Object>) -> Result<Object, Panic> + Send + Sync + 'static,
    {
        NativeFunction { name: name.into(), func: Box::new(func) }
    }

    pub fn call(&self, interp: &Interpreter, args: Vec<Object>) -> Result<Object, Panic> {
        (self.func)(interp, args)
    }
}

/// Single-use lazy sequence of `(key, value)` pairs
pub struct IteratorObject {
    producer: Box<Producer>,
    consumed: AtomicBool,
}

impl IteratorObject {
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Sink<'_>) -> Result<(), Panic> + Send + Sync + 'static,
    {
        IteratorObject { producer: Box::new(producer), consumed: AtomicBool::new(false) }
    }

    /// Run the producer into `sink`. A second drive yields nothing.
    pub fn drive(&self, sink: Sink<'_>) -> Result<(), Panic> {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        (self.producer)(sink)
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }
}

/// Inert error value returned by soft-failing builtins
#[derive(Debug)]
pub struct UserError {
    pub message: String,
}

/// Identity used for non-numeric table keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Nil,
    Number(u64),
    Str(Arc<str>),
    Identity(usize),
}

/// Runtime value
#[derive(Clone)]
pub enum Object {
    Nil,
    /// Numbers are doubles; booleans are 0 and 1
    Number(f64),
    Str(Arc<str>),
    Table(Table),
    Function(Arc<FunctionObject>),
    Native(Arc<NativeFunction>),
    Iterator(Arc<IteratorObject>),
    Error(Arc<UserError>),
    Promise(Promise),
    /// The read-only `$` view over the global frame
    Globals(WeakEnvironment),
}

fn arc_id<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as *const () as usize
}

/// Display form for numbers: shortest round-tripping decimal, never exponent
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "+Inf".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{}", n)
    }
}

impl Object {
    pub fn boolean(value: bool) -> Object {
        Object::Number(if value { 1.0 } else { 0.0 })
    }

    pub fn error(message: impl Into<String>) -> Object {
        Object::Error(Arc::new(UserError { message: message.into() }))
    }

    pub fn native<F>(name: impl Into<String>, func: F) -> Object
    where
        F: Fn(&Interpreter, Vec<Object>) -> Result<Object, Panic> + Send + Sync + 'static,
    {
        Object::Native(Arc::new(NativeFunction::new(name, func)))
    }

    pub fn iterator<F>(producer: F) -> Object
    where
        F: Fn(Sink<'_>) -> Result<(), Panic> + Send + Sync + 'static,
    {
        Object::Iterator(Arc::new(IteratorObject::new(producer)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Nil => "nil",
            Object::Number(_) => "number",
            Object::Str(_) => "string",
            Object::Table(_) | Object::Promise(_) | Object::Globals(_) => "object",
            Object::Function(_) | Object::Native(_) => "function",
            Object::Iterator(_) => "iterator",
            Object::Error(_) => "error",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Object::Nil)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Object::Nil => false,
            Object::Number(n) => *n != 0.0,
            Object::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Logical negation as a value (`!x`)
    pub fn not(&self) -> Object {
        Object::boolean(!self.truthy())
    }

    /// `==` semantics: value equality for numbers and strings, identity otherwise
    pub fn equals(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Nil, Object::Nil) => true,
            (Object::Number(a), Object::Number(b)) => a == b,
            (Object::Str(a), Object::Str(b)) => a == b,
            (Object::Table(a), Object::Table(b)) => a.ptr_eq(b),
            (Object::Function(a), Object::Function(b)) => Arc::ptr_eq(a, b),
            (Object::Native(a), Object::Native(b)) => Arc::ptr_eq(a, b),
            (Object::Iterator(a), Object::Iterator(b)) => Arc::ptr_eq(a, b),
            (Object::Error(a), Object::Error(b)) => Arc::ptr_eq(a, b),
            (Object::Promise(a), Object::Promise(b)) => a.ptr_eq(b),
            (Object::Globals(a), Object::Globals(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The language's `clone()`: tables are copied recursively and errors get
    /// a fresh identity; functions, iterators and promises are shared.
    pub fn clone_value(&self) -> Object {
        match self {
            Object::Table(table) => Object::Table(table.deep_clone()),
            Object::Error(err) => Object::error(err.message.clone()),
            other => other.clone(),
        }
    }

    pub fn hash_key(&self) -> HashKey {
        match self {
            Object::Nil => HashKey::Nil,
            Object::Number(n) => HashKey::Number(if *n == 0.0 { 0.0f64.to_bits() } else { n.to_bits() }),
            Object::Str(s) => HashKey::Str(s.clone()),
            Object::Table(t) => HashKey::Identity(t.id()),
            Object::Function(f) => HashKey::Identity(arc_id(f)),
            Object::Native(f) => HashKey::Identity(arc_id(f)),
            Object::Iterator(it) => HashKey::Identity(arc_id(it)),
            Object::Error(e) => HashKey::Identity(arc_id(e)),
            Object::Promise(p) => HashKey::Identity(p.id()),
            Object::Globals(g) => HashKey::Identity(g.id()),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Object::Function(_) | Object::Native(_))
    }

    pub fn is_indexable(&self) -> bool {
        matches!(self, Object::Table(_) | Object::Str(_) | Object::Promise(_) | Object::Globals(_))
    }

    pub fn is_iterable(&self) -> bool {
        matches!(self, Object::Table(_) | Object::Str(_) | Object::Iterator(_) | Object::Globals(_))
    }

    /// Indexed read (`obj[key]`, `obj.key`)
    pub fn get(&self, key: &Object) -> Result<Object, Panic> {
        match self {
            Object::Table(table) => Ok(table.get(key)),
            Object::Str(s) => string_index(s, key),
            Object::Promise(promise) => Ok(promise.member(key)),
            Object::Globals(view) => Ok(view.lookup(&key.to_string())),
            _ => Err(Panic::new(ErrorKind::NotIndexable, "cannot access member of non-indexable object")),
        }
    }

    /// Indexed write (`obj[key] = value`)
    pub fn set(&self, key: Object, value: Object) -> Result<(), Panic> {
        match self {
            Object::Table(table) => {
                table.set(key, value);
                Ok(())
            }
            Object::Str(_) => Err(Panic::type_error("strings are immutable")),
            Object::Promise(_) => Err(Panic::type_error("cannot modify Promise object")),
            Object::Globals(_) => Err(Panic::type_error("cannot modify $ object directly")),
            _ => Err(Panic::new(ErrorKind::NotIndexable, "cannot assign to member of non-indexable object")),
        }
    }

    /// Entry count for indexable values; strings count bytes
    pub fn length(&self) -> Option<usize> {
        match self {
            Object::Table(table) => Some(table.len()),
            Object::Str(s) => Some(s.len()),
            Object::Promise(_) => Some(0),
            Object::Globals(view) => Some(view.bindings().len()),
            _ => None,
        }
    }

    /// Feed every `(key, value)` pair into `sink` until it declines.
    ///
    /// Tables and `$` are snapshotted first. Custom `__iter` tables are
    /// handled by the evaluator, which can call back into user code.
    pub fn iterate(&self, sink: Sink<'_>) -> Result<(), Panic> {
        match self {
            Object::Table(table) => {
                for (key, value) in table.entries() {
                    if !sink(key, value)? {
                        break;
                    }
                }
                Ok(())
            }
            Object::Str(s) => {
                for (offset, ch) in s.char_indices() {
                    if !sink(Object::Number(offset as f64), Object::from(ch.to_string()))? {
                        break;
                    }
                }
                Ok(())
            }
            Object::Iterator(it) => it.drive(sink),
            Object::Globals(view) => {
                for (name, value) in view.bindings() {
                    if !sink(Object::from(name), value)? {
                        break;
                    }
                }
                Ok(())
            }
            _ => Err(Panic::new(ErrorKind::NotIterable, "cannot iterate over non-iterable object")),
        }
    }
}

fn string_index(s: &str, key: &Object) -> Result<Object, Panic> {
    let index = match key {
        Object::Number(n) => *n,
        _ => return Err(Panic::type_error("string index must be a number")),
    };
    if index < 0.0 || index.is_nan() || index.trunc() as usize >= s.len() {
        return Err(Panic::runtime("string index out of bounds"));
    }
    let offset = index.trunc() as usize;
    // Byte offsets inside a multi-byte character resolve to that character.
    let ch = s.char_indices().take_while(|(start, _)| *start <= offset).last().map(|(_, c)| c);
    match ch {
        Some(c) => Ok(Object::from(c.to_string())),
        None => Err(Panic::runtime("string index out of bounds")),
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Nil => write!(f, "nil"),
            Object::Number(n) => write!(f, "{}", format_number(*n)),
            Object::Str(s) => write!(f, "{}", s),
            Object::Table(_) => write!(f, "object"),
            Object::Function(_) | Object::Native(_) => write!(f, "function"),
            Object::Iterator(_) => write!(f, "iterator"),
            Object::Error(e) => write!(f, "{}", e.message),
            Object::Promise(p) => write!(f, "Promise<{}>", p.state_name()),
            Object::Globals(_) => write!(f, "$"),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Nil => write!(f, "Nil"),
            Object::Number(n) => write!(f, "Number({})", format_number(*n)),
            Object::Str(s) => write!(f, "Str({:?})", s),
            Object::Table(t) => write!(f, "{:?}", t),
            Object::Function(func) => write!(f, "Function({})", func.params.join(", ")),
            Object::Native(n) => write!(f, "Native({})", n.name),
            Object::Iterator(_) => write!(f, "Iterator"),
            Object::Error(e) => write!(f, "Error({:?})", e.message),
            Object::Promise(p) => write!(f, "Promise<{}>", p.state_name()),
            Object::Globals(_) => write!(f, "$"),
        }
    }
}

/// Uses `==` semantics, so tables compare by identity and NaN is unequal to itself
impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<f64> for Object {
    fn from(n: f64) -> Self {
        Object::Number(n)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::boolean(b)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::Str(Arc::from(s))
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Object::Str(Arc::from(s))
    }
}

impl From<Table> for Object {
    fn from(t: Table) -> Self {
        Object::Table(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_number_display_uses_shortest_form() {
        assert_eq!(Object::Number(8.0).to_string(), "8");
        assert_eq!(Object::Number(0.5).to_string(), "0.5");
        assert_eq!(Object::Number(f64::INFINITY).to_string(), "+Inf");
        assert_eq!(Object::Number(f64::NEG_INFINITY).to_string(), "-Inf");
        assert_eq!(Object::Number(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Object::Nil.truthy());
        assert!(!Object::Number(0.0).truthy());
        assert!(Object::Number(-1.0).truthy());
        assert!(!Object::from("").truthy());
        assert!(Object::from("x").truthy());
        assert!(Object::Table(Table::new()).truthy());
        assert!(Object::error("boom").truthy());
        assert_eq!(Object::Nil.not(), Object::Number(1.0));
    }

    #[test]
    fn test_equality_by_value_and_identity() {
        assert!(Object::Nil.equals(&Object::Nil));
        assert!(!Object::Nil.equals(&Object::Number(0.0)));
        assert!(Object::from("a").equals(&Object::from("a")));

        let table = Object::Table(Table::new());
        assert!(table.equals(&table.clone()));
        assert!(!table.equals(&Object::Table(Table::new())));

        let err = Object::error("same");
        assert!(err.equals(&err.clone()));
        assert!(!err.equals(&Object::error("same")));
    }

    #[test]
    fn test_clone_value_gives_errors_new_identity() {
        let err = Object::error("boom");
        let copy = err.clone_value();
        assert!(!err.equals(&copy));
        assert_eq!(copy.to_string(), "boom");
    }

    #[test]
    fn test_string_get_and_set() {
        let s = Object::from("héllo");
        assert_eq!(s.get(&Object::Number(0.0)).unwrap(), Object::from("h"));
        assert_eq!(s.get(&Object::Number(2.0)).unwrap(), Object::from("é"));
        assert_eq!(s.get(&Object::Number(3.0)).unwrap(), Object::from("l"));

        let err = s.get(&Object::Number(99.0)).unwrap_err();
        assert_eq!(err.message, "string index out of bounds");
        let err = s.get(&Object::from("x")).unwrap_err();
        assert_eq!(err.message, "string index must be a number");
        let err = s.set(Object::Number(0.0), Object::from("j")).unwrap_err();
        assert_eq!(err.message, "strings are immutable");
    }

    #[test]
    fn test_string_iteration_yields_byte_offsets() {
        let mut seen = Vec::new();
        Object::from("aé b")
            .iterate(&mut |k, v| {
                seen.push((k.to_string(), v.to_string()));
                Ok(true)
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("0".to_string(), "a".to_string()),
                ("1".to_string(), "é".to_string()),
                ("3".to_string(), " ".to_string()),
                ("4".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_iterator_is_single_use() {
        let it = Object::iterator(|sink| {
            for i in 0..3 {
                if !sink(Object::Number(i as f64), Object::Nil)? {
                    break;
                }
            }
            Ok(())
        });

        let mut first = 0;
        it.iterate(&mut |_, _| {
            first += 1;
            Ok(true)
        })
        .unwrap();
        let mut second = 0;
        it.iterate(&mut |_, _| {
            second += 1;
            Ok(true)
        })
        .unwrap();

        assert_eq!(first, 3);
        assert_eq!(second, 0);
    }

    #[test]
    fn test_early_exit_stops_producer() {
        let mut seen = 0;
        Object::Table(Table::from_array(vec![Object::Nil, Object::Nil, Object::Nil]))
            .iterate(&mut |_, _| {
                seen += 1;
                Ok(false)
            })
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_non_iterable_is_rejected() {
        let err = Object::Number(1.0).iterate(&mut |_, _| Ok(true)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotIterable);
        assert_eq!(err.message, "cannot iterate over non-iterable object");
    }
}
