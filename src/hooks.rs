//! Pre- and post-call hook wrappers.
//!
//! A [`HookedCallable`] runs a side callable before or after its
//! target on every invocation, transaction or not. Hooks receive the
//! argument list the target body sees, receiver first for bound
//! wrappers, and their return value is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::callable::{Callable, WrapperView};
use crate::diagnostics;
use crate::value::{AttrMap, CallArgs, CallResult, Value};
use crate::wrapper::WrapperCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Hook runs before the target; a hook error stops the call.
    Pre,
    /// Hook runs after the target. A hook error surfaces only when the
    /// target succeeded; a target error always wins and the hook
    /// failure goes to the unraisable channel.
    Post,
}

/// A callable with a hook attached.
pub struct HookedCallable {
    core: WrapperCore,
    hook: Arc<dyn Callable>,
    phase: HookPhase,
    run_once: bool,
    fired: Arc<AtomicBool>,
}

impl HookedCallable {
    pub fn pre(target: Arc<dyn Callable>, hook: Arc<dyn Callable>, run_once: bool) -> Arc<Self> {
        HookedCallable::wrap(target, hook, HookPhase::Pre, run_once)
    }

    pub fn post(target: Arc<dyn Callable>, hook: Arc<dyn Callable>, run_once: bool) -> Arc<Self> {
        HookedCallable::wrap(target, hook, HookPhase::Post, run_once)
    }

    pub fn wrap(
        target: Arc<dyn Callable>,
        hook: Arc<dyn Callable>,
        phase: HookPhase,
        run_once: bool,
    ) -> Arc<Self> {
        Arc::new(HookedCallable {
            core: WrapperCore::new(target),
            hook,
            phase,
            run_once,
            fired: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    /// One-shot gate. Bound copies share it, so "once" means once for
    /// the wrapper, not once per receiver.
    fn should_fire(&self) -> bool {
        if !self.run_once {
            return true;
        }
        !self.fired.swap(true, Ordering::AcqRel)
    }
}

impl Callable for HookedCallable {
    fn invoke(&self, args: &CallArgs) -> CallResult {
        match self.phase {
            HookPhase::Pre => {
                if self.should_fire() {
                    self.hook.invoke(&self.core.reconstructed_args(args))?;
                }
                self.core.effective_target().invoke(args)
            }
            HookPhase::Post => {
                let result = self.core.effective_target().invoke(args);
                if self.should_fire() {
                    if let Err(hook_error) =
                        self.hook.invoke(&self.core.reconstructed_args(args))
                    {
                        match result {
                            Err(_) => {
                                diagnostics::report_unraisable("post function hook", &hook_error)
                            }
                            Ok(_) => return Err(hook_error),
                        }
                    }
                }
                result
            }
        }
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
            Some(bound) => Some(Arc::new(HookedCallable {
                core: self.core.bound_copy(receiver, bound),
                hook: Arc::clone(&self.hook),
                phase: self.phase,
                run_once: self.run_once,
                fired: Arc::clone(&self.fired),
            })),
            None => Some(self),
        }
    }

    fn wrapper(&self) -> Option<WrapperView<'_>> {
        Some(self.core.view())
    }
}
