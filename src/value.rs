//! Call-boundary value model.
//!
//! Wrapped callables exchange dynamically typed values: positional and
//! keyword arguments going in, a single value or an application error
//! coming out. This module defines that vocabulary plus the shared
//! attribute storage that wrappers delegate to.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// A dynamically typed value crossing a call boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(Instance),
}

impl Value {
    /// Runtime type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    /// Borrow the text content when this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Object(v)
    }
}

/// A mutable object instance with identity semantics.
///
/// Clones share the same underlying storage, and equality is identity:
/// two instances compare equal only when they are the same allocation.
/// This is what lets a bound wrapper hand the receiver through to the
/// target without copying state.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    class_name: String,
    attrs: AttrMap,
}

impl Instance {
    pub fn new(class_name: &str) -> Self {
        Instance {
            inner: Arc::new(InstanceInner {
                class_name: class_name.to_string(),
                attrs: AttrMap::new(),
            }),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    /// Shared attribute storage for this instance.
    pub fn attrs(&self) -> &AttrMap {
        &self.inner.attrs
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.attrs.get(key)
    }

    pub fn set(&self, key: &str, value: Value) {
        self.inner.attrs.set(key, value);
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} instance at {:p}>",
            self.inner.class_name,
            Arc::as_ptr(&self.inner)
        )
    }
}

/// Shared string-keyed attribute storage.
///
/// Clones are views onto the same map, so a wrapper that adopts its
/// target's storage sees every update the target makes and vice versa.
/// Reads and writes survive a panicked writer rather than poisoning.
#[derive(Clone, Default)]
pub struct AttrMap {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl AttrMap {
    pub fn new() -> Self {
        AttrMap::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both views share the same underlying map.
    pub fn shares_storage_with(&self, other: &AttrMap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AttrMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map().entries(guard.iter()).finish()
    }
}

/// Positional and keyword arguments for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    keywords: HashMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        CallArgs::default()
    }

    /// Build from positional values only.
    pub fn positional<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        CallArgs {
            positional: values.into_iter().map(Into::into).collect(),
            keywords: HashMap::new(),
        }
    }

    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn with_keyword(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.keywords.insert(key.to_string(), value.into());
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.positional
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, key: &str) -> Option<&Value> {
        self.keywords.get(key)
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// A copy with `receiver` inserted as the first positional argument.
    ///
    /// Bound wrappers use this to rebuild the argument list the target
    /// method actually sees, since the receiver never appears in the
    /// caller-supplied arguments.
    pub fn prepended(&self, receiver: Value) -> CallArgs {
        let mut positional = Vec::with_capacity(self.positional.len() + 1);
        positional.push(receiver);
        positional.extend(self.positional.iter().cloned());
        CallArgs {
            positional,
            keywords: self.keywords.clone(),
        }
    }
}

/// An application error raised by a wrapped callable.
///
/// Carries a kind (the exception type, e.g. `"ValueError"`) and a
/// message. Wrappers must hand these through unchanged so a caller can
/// compare against what the target raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CallError {
    kind: String,
    message: String,
}

impl CallError {
    pub fn new(kind: &str, message: &str) -> Self {
        CallError {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        CallError {
            kind: "TypeError".to_string(),
            message: message.into(),
        }
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        CallError {
            kind: "ValueError".to_string(),
            message: message.into(),
        }
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        CallError {
            kind: "RuntimeError".to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of invoking a callable.
pub type CallResult = Result<Value, CallError>;
