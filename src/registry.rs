//! Locating and replacing callables by path.
//!
//! Instrumenting code you do not own means finding the callable where
//! it lives (a module's functions, or a class's methods) and swapping
//! the wrapper into that slot, so every caller that looks the name up
//! afterwards gets the instrumented version. The registry is that
//! name space.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use anyhow::{bail, Context, Result};

use crate::callable::Callable;
use crate::error_trace::ErrorTraceConfig;
use crate::hooks::{HookPhase, HookedCallable};
use crate::instrument::TraceConfig;

/// Where a registered callable hangs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Module(String),
    Class { module: String, class: String },
}

/// Result of a successful path lookup: the callable plus enough
/// information to install a replacement in its place.
#[derive(Debug)]
pub struct Located {
    pub callable: Arc<dyn Callable>,
    pub owner: Owner,
    pub attribute: String,
}

#[derive(Default)]
struct ClassEntry {
    methods: HashMap<String, Arc<dyn Callable>>,
}

#[derive(Default)]
struct ModuleEntry {
    functions: HashMap<String, Arc<dyn Callable>>,
    classes: HashMap<String, ClassEntry>,
}

/// Registered modules, their functions, and their classes' methods.
#[derive(Default)]
pub struct Registry {
    modules: RwLock<HashMap<String, ModuleEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Process-wide registry for code that does not thread its own
    /// through.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    pub fn register_function(&self, module: &str, name: &str, callable: Arc<dyn Callable>) {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        modules
            .entry(module.to_string())
            .or_default()
            .functions
            .insert(name.to_string(), callable);
    }

    pub fn register_method(
        &self,
        module: &str,
        class: &str,
        name: &str,
        callable: Arc<dyn Callable>,
    ) {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        modules
            .entry(module.to_string())
            .or_default()
            .classes
            .entry(class.to_string())
            .or_default()
            .methods
            .insert(name.to_string(), callable);
    }

    /// Current occupant of a slot, if registered.
    pub fn lookup(&self, module: &str, class: Option<&str>, name: &str) -> Option<Arc<dyn Callable>> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        let entry = modules.get(module)?;
        match class {
            None => entry.functions.get(name).cloned(),
            Some(class) => entry
                .classes
                .get(class)?
                .methods
                .get(name)
                .cloned(),
        }
    }

    /// Find a callable and remember where it came from.
    pub fn locate(&self, module: &str, class: Option<&str>, name: &str) -> Result<Located> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = modules.get(module) else {
            bail!("module '{}' is not registered", module);
        };
        match class {
            None => {
                let Some(callable) = entry.functions.get(name) else {
                    bail!("function '{}' not found in module '{}'", name, module);
                };
                Ok(Located {
                    callable: Arc::clone(callable),
                    owner: Owner::Module(module.to_string()),
                    attribute: name.to_string(),
                })
            }
            Some(class) => {
                let Some(class_entry) = entry.classes.get(class) else {
                    bail!("class '{}.{}' is not registered", module, class);
                };
                let Some(callable) = class_entry.methods.get(name) else {
                    bail!("method '{}' not found on class '{}.{}'", name, module, class);
                };
                Ok(Located {
                    callable: Arc::clone(callable),
                    owner: Owner::Class {
                        module: module.to_string(),
                        class: class.to_string(),
                    },
                    attribute: name.to_string(),
                })
            }
        }
    }

    /// Put `replacement` into an owner's slot. The owner must still be
    /// registered; the attribute is created or replaced.
    pub fn install(
        &self,
        owner: &Owner,
        attribute: &str,
        replacement: Arc<dyn Callable>,
    ) -> Result<()> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        match owner {
            Owner::Module(module) => {
                let Some(entry) = modules.get_mut(module) else {
                    bail!("module '{}' is not registered", module);
                };
                entry
                    .functions
                    .insert(attribute.to_string(), replacement);
            }
            Owner::Class { module, class } => {
                let Some(entry) = modules.get_mut(module) else {
                    bail!("module '{}' is not registered", module);
                };
                let Some(class_entry) = entry.classes.get_mut(class) else {
                    bail!("class '{}.{}' is not registered", module, class);
                };
                class_entry
                    .methods
                    .insert(attribute.to_string(), replacement);
            }
        }
        Ok(())
    }

    /// Wrap the callable at a path with a trace wrapper and install it
    /// in place. Returns the callable that was there before.
    pub fn wrap_function_trace(
        &self,
        module: &str,
        class: Option<&str>,
        name: &str,
        config: &TraceConfig,
    ) -> Result<Arc<dyn Callable>> {
        let located = self
            .locate(module, class, name)
            .with_context(|| format!("cannot instrument '{}:{}'", module, name))?;
        let wrapped = config.apply(Arc::clone(&located.callable));
        self.install(&located.owner, &located.attribute, wrapped)?;
        Ok(located.callable)
    }

    /// Wrap the callable at a path with an error-trace wrapper.
    pub fn wrap_error_trace(
        &self,
        module: &str,
        class: Option<&str>,
        name: &str,
        config: &ErrorTraceConfig,
    ) -> Result<Arc<dyn Callable>> {
        let located = self
            .locate(module, class, name)
            .with_context(|| format!("cannot instrument '{}:{}'", module, name))?;
        let wrapped = config.apply(Arc::clone(&located.callable));
        self.install(&located.owner, &located.attribute, wrapped)?;
        Ok(located.callable)
    }

    /// Attach a hook that runs before the callable at a path.
    pub fn wrap_pre_function(
        &self,
        module: &str,
        class: Option<&str>,
        name: &str,
        hook: Arc<dyn Callable>,
        run_once: bool,
    ) -> Result<Arc<dyn Callable>> {
        self.wrap_hook(module, class, name, hook, HookPhase::Pre, run_once)
    }

    /// Attach a hook that runs after the callable at a path.
    pub fn wrap_post_function(
        &self,
        module: &str,
        class: Option<&str>,
        name: &str,
        hook: Arc<dyn Callable>,
        run_once: bool,
    ) -> Result<Arc<dyn Callable>> {
        self.wrap_hook(module, class, name, hook, HookPhase::Post, run_once)
    }

    fn wrap_hook(
        &self,
        module: &str,
        class: Option<&str>,
        name: &str,
        hook: Arc<dyn Callable>,
        phase: HookPhase,
        run_once: bool,
    ) -> Result<Arc<dyn Callable>> {
        let located = self
            .locate(module, class, name)
            .with_context(|| format!("cannot instrument '{}:{}'", module, name))?;
        let wrapped = HookedCallable::wrap(Arc::clone(&located.callable), hook, phase, run_once);
        self.install(&located.owner, &located.attribute, wrapped)?;
        Ok(located.callable)
    }
}
