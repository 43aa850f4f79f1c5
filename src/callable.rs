//! The callable protocol.
//!
//! Everything the instrumentation layer can wrap implements [`Callable`]:
//! invocation, identity metadata, attribute storage, and descriptor-style
//! binding. Wrappers implement the same trait, which is what makes them
//! interchangeable with their targets.

use std::fmt;
use std::sync::Arc;

use crate::value::{AttrMap, CallArgs, CallResult, Value};

/// Borrowed view of a wrapper's delegation references.
///
/// `next` is the immediately wrapped callable, `last` the innermost
/// non-wrapper target at the end of the chain.
pub struct WrapperView<'a> {
    pub next: &'a Arc<dyn Callable>,
    pub last: &'a Arc<dyn Callable>,
}

/// A callable object that can also be introspected and bound.
///
/// The accessor set is deliberately closed. Wrappers forward each of
/// these to their target, so any metadata a caller can observe on a
/// plain callable it observes identically on a wrapped one.
pub trait Callable: Send + Sync {
    /// Invoke with the given arguments.
    fn invoke(&self, args: &CallArgs) -> CallResult;

    /// Callable name, qualified with the class name for methods.
    fn name(&self) -> String;

    /// Module the callable was defined in, when known.
    fn module(&self) -> Option<String> {
        None
    }

    /// Documentation string, when present.
    fn doc(&self) -> Option<String> {
        None
    }

    /// Attribute storage carried by this callable.
    fn attrs(&self) -> AttrMap;

    /// Read one attribute.
    fn attr(&self, key: &str) -> Option<Value> {
        self.attrs().get(key)
    }

    /// Write one attribute.
    fn set_attr(&self, key: &str, value: Value) {
        self.attrs().set(key, value);
    }

    /// Bind to a receiver, producing the callable an attribute access on
    /// an instance would yield.
    ///
    /// Returns `None` when this callable does not participate in
    /// binding (plain functions). Callables that do bind return
    /// themselves for `receiver: None` (class-level access) and a bound
    /// form for `Some(receiver)`.
    fn bind(self: Arc<Self>, receiver: Option<Value>) -> Option<Arc<dyn Callable>> {
        let _ = receiver;
        None
    }

    /// Wrapper marker: `Some` when this callable is an instrumentation
    /// wrapper, exposing its delegation references.
    fn wrapper(&self) -> Option<WrapperView<'_>> {
        None
    }
}

impl fmt::Debug for dyn Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.module() {
            Some(module) => write!(f, "<callable {}:{}>", module, self.name()),
            None => write!(f, "<callable {}>", self.name()),
        }
    }
}

type CallFn = dyn Fn(&CallArgs) -> CallResult + Send + Sync;

/// A plain function backed by a Rust closure.
pub struct NativeFunction {
    name: String,
    module: Option<String>,
    doc: Option<String>,
    attrs: AttrMap,
    func: Box<CallFn>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        NativeFunction {
            name: name.to_string(),
            module: None,
            doc: None,
            attrs: AttrMap::new(),
            func: Box::new(func),
        }
    }

    pub fn with_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    /// Finish construction as a shared trait object.
    pub fn build(self) -> Arc<dyn Callable> {
        Arc::new(self)
    }
}

impl Callable for NativeFunction {
    fn invoke(&self, args: &CallArgs) -> CallResult {
        (self.func)(args)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn module(&self) -> Option<String> {
        self.module.clone()
    }

    fn doc(&self) -> Option<String> {
        self.doc.clone()
    }

    fn attrs(&self) -> AttrMap {
        self.attrs.clone()
    }
}

/// An unbound method: a function that expects its receiver as the first
/// positional argument, plus the class it belongs to.
pub struct Method {
    class_name: String,
    method_name: String,
    module: Option<String>,
    doc: Option<String>,
    attrs: AttrMap,
    func: Arc<CallFn>,
}

impl Method {
    pub fn new<F>(class_name: &str, method_name: &str, func: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        Method {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            module: None,
            doc: None,
            attrs: AttrMap::new(),
            func: Arc::new(func),
        }
    }

    pub fn with_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    pub fn build(self) -> Arc<dyn Callable> {
        Arc::new(self)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

impl Callable for Method {
    /// Unbound invocation: the caller supplies the receiver explicitly
    /// as the first positional argument.
    fn invoke(&self, args: &CallArgs) -> CallResult {
        (self.func)(args)
    }

    fn name(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    fn module(&self) -> Option<String> {
        self.module.clone()
    }

    fn doc(&self) -> Option<String> {
        self.doc.clone()
    }

    fn attrs(&self) -> AttrMap {
        self.attrs.clone()
    }

    fn bind(self: Arc<Self>, receiver: Option<Value>) -> Option<Arc<dyn Callable>> {
        match receiver {
            None => Some(self),
            Some(receiver) => Some(Arc::new(BoundMethod {
                receiver,
                method: self,
            })),
        }
    }
}

/// A method bound to a receiver. Invocation reinserts the receiver as
/// the first positional argument before delegating to the method body.
pub struct BoundMethod {
    receiver: Value,
    method: Arc<Method>,
}

impl BoundMethod {
    pub fn receiver(&self) -> &Value {
        &self.receiver
    }
}

impl Callable for BoundMethod {
    fn invoke(&self, args: &CallArgs) -> CallResult {
        let full = args.prepended(self.receiver.clone());
        (self.method.func)(&full)
    }

    fn name(&self) -> String {
        self.method.name()
    }

    fn module(&self) -> Option<String> {
        self.method.module.clone()
    }

    fn doc(&self) -> Option<String> {
        self.method.doc.clone()
    }

    fn attrs(&self) -> AttrMap {
        self.method.attrs.clone()
    }

    fn bind(self: Arc<Self>, _receiver: Option<Value>) -> Option<Arc<dyn Callable>> {
        // Already bound; further binding is a no-op.
        Some(self)
    }
}
