//! Error capture at wrapper boundaries.
//!
//! An [`ErrorTraceWrapper`] lets application errors pass through
//! untouched while noting them in the current transaction, so a
//! finished trace can report what went wrong and where. Error kinds on
//! the ignore list cross the boundary without being recorded.

use std::sync::Arc;

use crate::callable::{Callable, WrapperView};
use crate::transaction::Transaction;
use crate::value::{AttrMap, CallArgs, CallResult, Value};
use crate::wrapper::WrapperCore;

/// Wraps a callable so errors it raises are recorded into the current
/// transaction. The error itself is re-raised unchanged.
pub struct ErrorTraceWrapper {
    core: WrapperCore,
    ignore: Arc<Vec<String>>,
}

impl ErrorTraceWrapper {
    pub fn wrap<I, S>(target: Arc<dyn Callable>, ignore: I) -> Arc<ErrorTraceWrapper>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(ErrorTraceWrapper {
            core: WrapperCore::new(target),
            ignore: Arc::new(ignore.into_iter().map(Into::into).collect()),
        })
    }

    pub fn last_object(&self) -> &Arc<dyn Callable> {
        self.core.last()
    }

    /// Error kinds that cross this boundary unrecorded.
    pub fn ignored_kinds(&self) -> &[String] {
        &self.ignore
    }
}

impl Callable for ErrorTraceWrapper {
    fn invoke(&self, args: &CallArgs) -> CallResult {
        let Some(transaction) = Transaction::current() else {
            return self.core.effective_target().invoke(args);
        };

        let result = self.core.effective_target().invoke(args);
        if let Err(error) = &result {
            if !self.ignore.iter().any(|kind| kind == error.kind()) {
                transaction.notice_error(error);
            }
        }
        result
    }

    fn name(&self) -> String {
        self.core.last().name()
    }

    fn module(&self) -> Option<String> {
        self.core.last().module()
    }

    fn doc(&self) -> Option<String> {
        self.core.last().doc()
    }

    fn attrs(&self) -> AttrMap {
        self.core.attrs()
    }

    fn attr(&self, key: &str) -> Option<Value> {
        match self.core.attrs().get(key) {
            Some(value) => Some(value),
            None => self.core.last().attr(key),
        }
    }

    fn set_attr(&self, key: &str, value: Value) {
        self.core.last().set_attr(key, value);
    }

    fn bind(self: Arc<Self>, receiver: Option<Value>) -> Option<Arc<dyn Callable>> {
        let Some(receiver) = receiver else {
            return Some(self);
        };
        match Arc::clone(self.core.next()).bind(Some(receiver.clone())) {
            Some(bound) => Some(Arc::new(ErrorTraceWrapper {
                core: self.core.bound_copy(receiver, bound),
                ignore: Arc::clone(&self.ignore),
            })),
            None => Some(self),
        }
    }

    fn wrapper(&self) -> Option<WrapperView<'_>> {
        Some(self.core.view())
    }
}

/// Reusable error-trace configuration.
#[derive(Debug, Clone, Default)]
pub struct ErrorTraceConfig {
    ignore: Vec<String>,
}

impl ErrorTraceConfig {
    pub fn new() -> Self {
        ErrorTraceConfig::default()
    }

    /// Add an error kind to the ignore list.
    pub fn ignoring(mut self, kind: impl Into<String>) -> Self {
        self.ignore.push(kind.into());
        self
    }

    pub fn apply(&self, target: Arc<dyn Callable>) -> Arc<ErrorTraceWrapper> {
        ErrorTraceWrapper::wrap(target, self.ignore.iter().cloned())
    }
}

/// Decorator-style factory for error tracing.
pub fn error_trace() -> ErrorTraceConfig {
    ErrorTraceConfig::new()
}
