//! Ready-made instrumentation surface.
//!
//! [`TraceConfig`] is a reusable bundle of naming and significance
//! choices: build it once, apply it to as many callables as needed.
//! [`wrap`] covers the common case of derived names and default scope,
//! and [`trace_call!`](crate::trace_call) times an inline block
//! against the current transaction without wrapping anything.

use std::sync::Arc;

use crate::callable::Callable;
use crate::naming::{NameSpec, ScopeSpec};
use crate::value::{CallArgs, CallResult};
use crate::wrapper::TraceWrapper;

/// Reusable wrap configuration.
///
/// Cloning is cheap and applying never consumes the config, so one
/// instance can instrument a whole module's worth of callables.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    name: NameSpec,
    scope: ScopeSpec,
    significant: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig::new()
    }
}

impl TraceConfig {
    /// Derived name, default scope, significant.
    pub fn new() -> Self {
        TraceConfig {
            name: NameSpec::Auto,
            scope: ScopeSpec::Unspecified,
            significant: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<NameSpec>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_computed_name<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.name = NameSpec::computed(f);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<ScopeSpec>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_computed_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.scope = ScopeSpec::computed(f);
        self
    }

    /// Mark produced nodes as subject to the duration threshold, so
    /// fast calls drop out of the trace instead of cluttering it.
    pub fn with_significant(mut self, significant: bool) -> Self {
        self.significant = significant;
        self
    }

    /// Wrap one callable with this configuration.
    pub fn apply(&self, target: Arc<dyn Callable>) -> Arc<TraceWrapper> {
        TraceWrapper::wrap(
            target,
            self.name.clone(),
            self.scope.clone(),
            self.significant,
        )
    }
}

/// Decorator-style factory: the default configuration, ready for
/// builder-style refinement.
pub fn function_trace() -> TraceConfig {
    TraceConfig::new()
}

/// Wrap with derived naming, default scope, and significance on.
pub fn wrap(target: Arc<dyn Callable>) -> Arc<TraceWrapper> {
    TraceConfig::new().apply(target)
}

/// Time a block against the current transaction.
///
/// Expands to the block's value; with no transaction running the block
/// executes untimed. Span failures are reported through the
/// unraisable channel, never raised into the block's caller.
///
/// ```
/// use envolver::transaction::Transaction;
/// use envolver::trace_call;
///
/// let txn = Transaction::new("demo");
/// let active = txn.activate().unwrap();
/// let total = trace_call!("sum_batch", (0..100u64).sum::<u64>());
/// assert_eq!(total, 4950);
/// active.finish();
/// ```
#[macro_export]
macro_rules! trace_call {
    ($name:expr, $body:expr) => {{
        let __transaction = $crate::transaction::Transaction::current();
        let mut __span = match __transaction.as_ref() {
            Some(txn) => match $crate::call_span::CallSpan::new(txn, $name, None, true) {
                Ok(mut span) => {
                    span.start();
                    Some(span)
                }
                Err(error) => {
                    $crate::diagnostics::report_unraisable("trace_call entry", &error);
                    None
                }
            },
            None => None,
        };
        let __result = $body;
        if let Some(span) = __span.as_mut() {
            span.stop(None);
        }
        __result
    }};
    ($name:expr, scope = $scope:expr, $body:expr) => {{
        let __transaction = $crate::transaction::Transaction::current();
        let mut __span = match __transaction.as_ref() {
            Some(txn) => match $crate::call_span::CallSpan::new(txn, $name, Some($scope), true) {
                Ok(mut span) => {
                    span.start();
                    Some(span)
                }
                Err(error) => {
                    $crate::diagnostics::report_unraisable("trace_call entry", &error);
                    None
                }
            },
            None => None,
        };
        let __result = $body;
        if let Some(span) = __span.as_mut() {
            span.stop(None);
        }
        __result
    }};
}
