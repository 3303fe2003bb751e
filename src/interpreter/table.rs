// File: src/interpreter/table.rs
//
// Storage for the language's single associative container.
//
// A table keeps two parts: number keys live in an ordered map so iteration
// always visits them in ascending numeric order, and every other key lives
// in a hash map keyed by the value's hash identity. Array literals are just
// tables whose numeric part starts at 0.

use super::value::{HashKey, Object};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Number key with a total order.
///
/// `-0.0` is folded into `0.0` so both spellings address the same slot.
#[derive(Debug, Clone, Copy)]
struct NumericKey(f64);

impl NumericKey {
    fn new(value: f64) -> Self {
        if value == 0.0 {
            NumericKey(0.0)
        } else {
            NumericKey(value)
        }
    }
}

impl PartialEq for NumericKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for NumericKey {}

impl PartialOrd for NumericKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumericKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Default)]
struct TableData {
    numeric: BTreeMap<NumericKey, Object>,
    // The original key is kept next to the value so iteration can hand it back.
    other: AHashMap<HashKey, (Object, Object)>,
}

/// Shared, mutable table handle. Cloning the handle aliases the same table;
/// use [`Table::deep_clone`] for a language-level copy.
#[derive(Clone, Default)]
pub struct Table(Arc<RwLock<TableData>>);

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table with keys 0, 1, 2, ... for the given values
    pub fn from_array(values: Vec<Object>) -> Self {
        let table = Table::new();
        {
            let mut data = table.0.write();
            for (index, value) in values.into_iter().enumerate() {
                data.numeric.insert(NumericKey::new(index as f64), value);
            }
        }
        table
    }

    /// Look up a key; missing keys read as nil
    pub fn get(&self, key: &Object) -> Object {
        let data = self.0.read();
        match key {
            Object::Number(n) => data.numeric.get(&NumericKey::new(*n)).cloned().unwrap_or(Object::Nil),
            other => data.other.get(&other.hash_key()).map(|(_, v)| v.clone()).unwrap_or(Object::Nil),
        }
    }

    pub fn get_str(&self, key: &str) -> Object {
        self.get(&Object::from(key))
    }

    /// Create or overwrite the entry for `key`
    pub fn set(&self, key: Object, value: Object) {
        let mut data = self.0.write();
        match key {
            Object::Number(n) => {
                data.numeric.insert(NumericKey::new(n), value);
            }
            other => {
                data.other.insert(other.hash_key(), (other, value));
            }
        }
    }

    pub fn set_str(&self, key: &str, value: Object) {
        self.set(Object::from(key), value);
    }

    pub fn len(&self) -> usize {
        let data = self.0.read();
        data.numeric.len() + data.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry: numeric keys ascending, then the rest in hash order.
    ///
    /// Iteration works on the snapshot so loop bodies may freely mutate the
    /// table they are walking.
    pub fn entries(&self) -> Vec<(Object, Object)> {
        let data = self.0.read();
        let mut entries = Vec::with_capacity(data.numeric.len() + data.other.len());
        for (key, value) in &data.numeric {
            entries.push((Object::Number(key.0), value.clone()));
        }
        for (key, value) in data.other.values() {
            entries.push((key.clone(), value.clone()));
        }
        entries
    }

    /// Language-level copy: keys and values are cloned with `clone_value`,
    /// so nested tables are copied recursively.
    pub fn deep_clone(&self) -> Table {
        let entries = self.entries();
        let cloned = Table::new();
        for (key, value) in entries {
            cloned.set(key.clone_value(), value.clone_value());
        }
        cloned
    }

    pub fn ptr_eq(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table(len={})", self.len())
    }
}
