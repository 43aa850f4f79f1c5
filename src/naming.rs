//! Trace name and scope resolution.
//!
//! A wrapper decides what its trace node is called in one of three
//! ways: derive it from the target's own identity, take literal text,
//! or compute it per call from the arguments. Scope works the same
//! way, with "unspecified" standing in for the default applied at span
//! creation.

use std::fmt;
use std::sync::Arc;

use crate::callable::Callable;
use crate::value::{CallArgs, CallError, CallResult, Value};

/// Separator between module and callable name in derived trace names.
pub const NAME_SEPARATOR: &str = ":";

type ComputeFn = Arc<dyn Fn(&CallArgs) -> CallResult + Send + Sync>;

/// `"module:qualified_name"`, or just the qualified name when the
/// module is unknown.
pub fn derive_callable_name(target: &dyn Callable, separator: &str) -> String {
    match target.module() {
        Some(module) => format!("{}{}{}", module, separator, target.name()),
        None => target.name(),
    }
}

/// How a wrapper names its trace nodes.
#[derive(Clone, Default)]
pub enum NameSpec {
    /// Derive from the wrapped callable's module and name.
    #[default]
    Auto,
    /// Use this text verbatim.
    Literal(String),
    /// Compute from the call arguments. Bound wrappers pass the
    /// reconstructed argument list, receiver first.
    Computed(ComputeFn),
}

impl NameSpec {
    pub fn literal(name: impl Into<String>) -> Self {
        NameSpec::Literal(name.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        NameSpec::Computed(Arc::new(f))
    }

    /// True when resolution needs the call arguments.
    pub fn needs_args(&self) -> bool {
        matches!(self, NameSpec::Computed(_))
    }

    /// Resolve to the final trace name. Computed specs that fail, or
    /// produce a non-string, yield an application error that must
    /// surface before the target runs.
    pub fn resolve(
        &self,
        target: &Arc<dyn Callable>,
        args: &CallArgs,
    ) -> Result<String, CallError> {
        match self {
            NameSpec::Auto => Ok(derive_callable_name(target.as_ref(), NAME_SEPARATOR)),
            NameSpec::Literal(name) => Ok(name.clone()),
            NameSpec::Computed(f) => expect_text("name", f(args)?),
        }
    }
}

impl From<&str> for NameSpec {
    fn from(name: &str) -> Self {
        NameSpec::Literal(name.to_string())
    }
}

impl From<String> for NameSpec {
    fn from(name: String) -> Self {
        NameSpec::Literal(name)
    }
}

impl fmt::Debug for NameSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameSpec::Auto => write!(f, "Auto"),
            NameSpec::Literal(name) => f.debug_tuple("Literal").field(name).finish(),
            NameSpec::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// How a wrapper scopes its trace nodes.
#[derive(Clone, Default)]
pub enum ScopeSpec {
    /// No scope named here; span creation applies its default.
    #[default]
    Unspecified,
    Literal(String),
    Computed(ComputeFn),
}

impl ScopeSpec {
    pub fn literal(scope: impl Into<String>) -> Self {
        ScopeSpec::Literal(scope.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        ScopeSpec::Computed(Arc::new(f))
    }

    pub fn needs_args(&self) -> bool {
        matches!(self, ScopeSpec::Computed(_))
    }

    /// Resolve to the scope text, `None` meaning "use the default".
    pub fn resolve(&self, args: &CallArgs) -> Result<Option<String>, CallError> {
        match self {
            ScopeSpec::Unspecified => Ok(None),
            ScopeSpec::Literal(scope) => Ok(Some(scope.clone())),
            ScopeSpec::Computed(f) => expect_text("scope", f(args)?).map(Some),
        }
    }
}

impl From<&str> for ScopeSpec {
    fn from(scope: &str) -> Self {
        ScopeSpec::Literal(scope.to_string())
    }
}

impl fmt::Debug for ScopeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeSpec::Unspecified => write!(f, "Unspecified"),
            ScopeSpec::Literal(scope) => f.debug_tuple("Literal").field(scope).finish(),
            ScopeSpec::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

fn expect_text(what: &str, value: Value) -> Result<String, CallError> {
    match value {
        Value::Str(text) => Ok(text),
        other => Err(CallError::type_error(format!(
            "expected string for {}, found type '{}'",
            what,
            other.type_name()
        ))),
    }
}
