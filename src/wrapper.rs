//! Transparent trace wrappers.
//!
//! A [`TraceWrapper`] stands in for the callable it wraps: same
//! metadata, same attribute storage, same binding behavior, same call
//! outcome. The only addition is a timed trace node around each call
//! made while a transaction is running. Without a transaction the
//! wrapper is pure pass-through.

use std::borrow::Cow;
use std::sync::Arc;

use crate::call_span::CallSpan;
use crate::callable::{Callable, WrapperView};
use crate::diagnostics;
use crate::naming::{NameSpec, ScopeSpec};
use crate::transaction::Transaction;
use crate::value::{AttrMap, CallArgs, CallResult, Value};

/// Delegation state shared by every wrapper kind.
///
/// `next` is the immediately wrapped callable; `last` the innermost
/// non-wrapper target. Wrapping an existing wrapper copies its `last`
/// rather than nesting lookups, so metadata delegation stays one hop
/// deep no matter how many wrappers stack up.
pub(crate) struct WrapperCore {
    next: Arc<dyn Callable>,
    last: Arc<dyn Callable>,
    attrs: AttrMap,
    bound: Option<BoundTarget>,
}

struct BoundTarget {
    receiver: Value,
    target: Arc<dyn Callable>,
}

impl WrapperCore {
    pub(crate) fn new(target: Arc<dyn Callable>) -> Self {
        let last = match target.wrapper() {
            Some(view) => Arc::clone(view.last),
            None => Arc::clone(&target),
        };
        // Adopt the target's storage so attribute traffic on the
        // wrapper and on the target see the same map.
        let attrs = last.attrs();
        WrapperCore {
            next: target,
            last,
            attrs,
            bound: None,
        }
    }

    /// Core for a bound copy: same delegation references and storage,
    /// plus the receiver and the bound callable that binding produced.
    pub(crate) fn bound_copy(&self, receiver: Value, target: Arc<dyn Callable>) -> Self {
        WrapperCore {
            next: Arc::clone(&self.next),
            last: Arc::clone(&self.last),
            attrs: self.attrs.clone(),
            bound: Some(BoundTarget { receiver, target }),
        }
    }

    pub(crate) fn next(&self) -> &Arc<dyn Callable> {
        &self.next
    }

    pub(crate) fn last(&self) -> &Arc<dyn Callable> {
        &self.last
    }

    pub(crate) fn attrs(&self) -> AttrMap {
        self.attrs.clone()
    }

    pub(crate) fn bound_receiver(&self) -> Option<&Value> {
        self.bound.as_ref().map(|b| &b.receiver)
    }

    /// The callable actually invoked: the bound form when bound, the
    /// immediate target otherwise.
    pub(crate) fn effective_target(&self) -> &Arc<dyn Callable> {
        match self.bound.as_ref() {
            Some(bound) => &bound.target,
            None => &self.next,
        }
    }

    /// Arguments as the target method sees them. A bound wrapper puts
    /// the receiver back in front, since the caller never passed it.
    pub(crate) fn reconstructed_args<'a>(&self, args: &'a CallArgs) -> Cow<'a, CallArgs> {
        match self.bound.as_ref() {
            Some(bound) => Cow::Owned(args.prepended(bound.receiver.clone())),
            None => Cow::Borrowed(args),
        }
    }

    pub(crate) fn view(&self) -> WrapperView<'_> {
        WrapperView {
            next: &self.next,
            last: &self.last,
        }
    }
}

/// Wraps a callable so each call adds a timed node to the current
/// transaction's trace.
pub struct TraceWrapper {
    core: WrapperCore,
    name: NameSpec,
    scope: ScopeSpec,
    significant: bool,
}

impl TraceWrapper {
    pub fn wrap(
        target: Arc<dyn Callable>,
        name: NameSpec,
        scope: ScopeSpec,
        significant: bool,
    ) -> Arc<TraceWrapper> {
        Arc::new(TraceWrapper {
            core: WrapperCore::new(target),
            name,
            scope,
            significant,
        })
    }

    /// The immediately wrapped callable.
    pub fn next_object(&self) -> &Arc<dyn Callable> {
        self.core.next()
    }

    /// The innermost non-wrapper target.
    pub fn last_object(&self) -> &Arc<dyn Callable> {
        self.core.last()
    }

    /// The receiver this wrapper was bound to, if any.
    pub fn bound_receiver(&self) -> Option<&Value> {
        self.core.bound_receiver()
    }

    pub fn significant(&self) -> bool {
        self.significant
    }
}

impl Callable for TraceWrapper {
    fn invoke(&self, args: &CallArgs) -> CallResult {
        let Some(transaction) = Transaction::current() else {
            return self.core.effective_target().invoke(args);
        };

        // Computed specs see the argument list the target method sees,
        // receiver included; literal and derived specs never need it.
        let spec_args = if self.name.needs_args() || self.scope.needs_args() {
            self.core.reconstructed_args(args)
        } else {
            Cow::Borrowed(args)
        };
        let name = self.name.resolve(self.core.next(), &spec_args)?;
        let scope = self.scope.resolve(&spec_args)?;

        let mut span =
            match CallSpan::new(&transaction, &name, scope.as_deref(), self.significant) {
                Ok(span) => Some(span),
                Err(error) => {
                    diagnostics::report_unraisable("function trace entry", &error);
                    None
                }
            };
        if let Some(span) = span.as_mut() {
            span.start();
        }

        let result = self.core.effective_target().invoke(args);

        if let Some(span) = span.as_mut() {
            span.stop(result.as_ref().err());
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
        match self.core.attrs.get(key) {
            Some(value) => Some(value),
            None => self.core.last().attr(key),
        }
    }

    fn set_attr(&self, key: &str, value: Value) {
        self.core.last().set_attr(key, value);
    }

    fn bind(self: Arc<Self>, receiver: Option<Value>) -> Option<Arc<dyn Callable>> {
        let Some(receiver) = receiver else {
            // Class-level access: the wrapper itself.
            return Some(self);
        };
        match Arc::clone(self.core.next()).bind(Some(receiver.clone())) {
            Some(bound) => Some(Arc::new(TraceWrapper {
                core: self.core.bound_copy(receiver, bound),
                name: self.name.clone(),
                scope: self.scope.clone(),
                significant: self.significant,
            })),
            // Target takes no receiver; hand the wrapper out as-is.
            None => Some(self),
        }
    }

    fn wrapper(&self) -> Option<WrapperView<'_>> {
        Some(self.core.view())
    }
}
