//! # Payload values carried by the bus.
//!
//! [`Value`] is a JSON superset able to hold the things that are unsafe to put
//! on a transport directly: maps and sets with non-string keys, errors,
//! function descriptors, DOM node descriptors and **shared nodes**.
//!
//! A [`SharedValue`] is an identity-bearing node (`Arc<RwLock<Value>>`). It is
//! the only way to build a cyclic graph, and it is what the codec's visited-set
//! tracks when it detects cycles.
//!
//! ```rust
//! use relaybus::{SharedValue, Value};
//!
//! let node = SharedValue::new(Value::object());
//! node.with_mut(|v| v.insert("me", Value::Shared(node.clone())));
//! assert!(Value::Shared(node.clone()).is_complex());
//! ```
//!
//! Cycles built from shared nodes keep each other alive; break them with
//! [`SharedValue::replace`] when the graph is no longer needed.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// String-keyed object map (deterministic key order).
pub type Map = BTreeMap<String, Value>;

/// A payload value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// JSON null (also stands in for "undefined").
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (non-finite values serialize as null).
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list.
    Array(Vec<Value>),
    /// String-keyed object.
    Object(Map),
    /// Ordered map with arbitrary keys.
    Map(Vec<(Value, Value)>),
    /// Ordered set.
    Set(Vec<Value>),
    /// Error value.
    Error(ErrorValue),
    /// Inert descriptor of a function (not callable).
    Function(FunctionDescriptor),
    /// Inert, read-only descriptor of a DOM node.
    Dom(DomDescriptor),
    /// Identity-bearing node; may participate in cycles.
    Shared(SharedValue),
}

/// Structured error payload.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ErrorValue {
    /// Error class name (e.g. `TypeError`).
    pub name: String,
    /// Message.
    pub message: String,
    /// Stack trace, if any.
    pub stack: Option<String>,
    /// Underlying cause.
    pub cause: Option<Box<Value>>,
    /// Additional own properties.
    pub extras: Map,
}

impl ErrorValue {
    /// Creates an error with a name and message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Descriptor of a function; survives transport but is never callable again.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct FunctionDescriptor {
    /// Function name (may be empty).
    pub name: String,
    /// Source text (truncated by the codec).
    pub source: String,
    /// Declared `async`.
    pub is_async: bool,
    /// Arrow function.
    pub is_arrow: bool,
    /// Declared parameter count.
    pub length: u32,
}

/// Flattened, read-only descriptor of a DOM node.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct DomDescriptor {
    /// Upper-case tag name.
    pub tag_name: String,
    /// `id` attribute.
    pub id: String,
    /// `class` attribute.
    pub class_name: String,
    /// Text content (truncated by the codec).
    pub text_content: String,
    /// All attributes.
    pub attributes: BTreeMap<String, String>,
}

/// Shared, identity-bearing node.
///
/// Equality is identity (`Arc::ptr_eq`), which keeps `==` terminating on cycles.
#[derive(Clone)]
pub struct SharedValue(Arc<RwLock<Value>>);

impl SharedValue {
    /// Wraps a value into a new shared node.
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Returns a clone of the inner value.
    pub fn get(&self) -> Value {
        self.0.read().clone()
    }

    /// Replaces the inner value, returning the previous one.
    pub fn replace(&self, value: Value) -> Value {
        std::mem::replace(&mut *self.0.write(), value)
    }

    /// Runs `f` with shared access to the inner value.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.0.read())
    }

    /// Runs `f` with exclusive access to the inner value.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.0.write())
    }

    /// Stable identity of this node (address of the shared allocation).
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared(@{:#x})", self.addr())
    }
}

impl Value {
    /// An empty object.
    pub fn object() -> Self {
        Value::Object(Map::new())
    }

    /// Inserts `key` into an object value; no-op for other variants.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Value::Object(map) = self {
            map.insert(key.into(), value.into());
        }
    }

    /// Looks up `key` in an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns the string slice of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number of a number value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the map of an object value.
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// True for null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True if the value (or anything nested in it) cannot be put on a
    /// transport as plain JSON.
    pub fn is_complex(&self) -> bool {
        match self {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => false,
            Value::Array(items) => items.iter().any(Value::is_complex),
            Value::Object(map) => map.values().any(Value::is_complex),
            Value::Map(_)
            | Value::Set(_)
            | Value::Error(_)
            | Value::Function(_)
            | Value::Dom(_)
            | Value::Shared(_) => true,
        }
    }

    /// Rough JSON byte size of the value; shared nodes are counted once per path
    /// and cycles are cut.
    pub fn approx_size(&self) -> usize {
        let mut on_stack = HashSet::new();
        approx_size(self, &mut on_stack)
    }
}

fn approx_size(value: &Value, on_stack: &mut HashSet<usize>) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(b) => {
            if *b {
                4
            } else {
                5
            }
        }
        Value::Number(n) => n.to_string().len(),
        Value::String(s) => s.len() + 2,
        Value::Array(items) | Value::Set(items) => {
            2 + items
                .iter()
                .map(|v| approx_size(v, on_stack) + 1)
                .sum::<usize>()
        }
        Value::Object(map) => {
            2 + map
                .iter()
                .map(|(k, v)| k.len() + 4 + approx_size(v, on_stack))
                .sum::<usize>()
        }
        Value::Map(entries) => {
            2 + entries
                .iter()
                .map(|(k, v)| approx_size(k, on_stack) + approx_size(v, on_stack) + 4)
                .sum::<usize>()
        }
        Value::Error(e) => {
            e.name.len()
                + e.message.len()
                + e.stack.as_ref().map_or(0, String::len)
                + e.cause.as_ref().map_or(0, |c| approx_size(c, on_stack))
                + 32
        }
        Value::Function(f) => f.name.len() + f.source.len() + 48,
        Value::Dom(d) => {
            d.tag_name.len()
                + d.id.len()
                + d.class_name.len()
                + d.text_content.len()
                + d.attributes
                    .iter()
                    .map(|(k, v)| k.len() + v.len() + 6)
                    .sum::<usize>()
                + 64
        }
        Value::Shared(node) => {
            let addr = node.addr();
            if !on_stack.insert(addr) {
                return 12;
            }
            let size = node.with(|inner| approx_size(inner, on_stack));
            on_stack.remove(&addr);
            size
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}

impl From<SharedValue> for Value {
    fn from(node: SharedValue) -> Self {
        Value::Shared(node)
    }
}
