//! Timed call spans.
//!
//! A [`CallSpan`] is the handle a wrapper (or any instrumentation site)
//! holds for the duration of one call: created against a running
//! transaction, started just before the target runs, stopped right
//! after. Creation validates eagerly; start and stop never fail
//! outward, they degrade to no-ops and report through the unraisable
//! channel instead.

use std::sync::Arc;

use crate::diagnostics;
use crate::trace_tree::NodeId;
use crate::transaction::{TraceError, Transaction, TransactionState};
use crate::value::CallError;

/// Scope applied when the instrumentation site does not name one.
pub const DEFAULT_SCOPE: &str = "Function";

/// Handle for one timed call within a transaction trace.
#[derive(Debug)]
pub struct CallSpan {
    transaction: Arc<Transaction>,
    node: Option<NodeId>,
    previous: Option<NodeId>,
    significant: bool,
    started: bool,
    stopped: bool,
}

impl CallSpan {
    /// Open a span against `transaction`.
    ///
    /// Fails with [`TraceError::NotRunning`] unless the transaction is
    /// in its running state. Against a dummy transaction this succeeds
    /// but records nothing. A missing `scope` means [`DEFAULT_SCOPE`].
    pub fn new(
        transaction: &Arc<Transaction>,
        name: &str,
        scope: Option<&str>,
        significant: bool,
    ) -> Result<CallSpan, TraceError> {
        if transaction.state() != TransactionState::Running {
            return Err(TraceError::NotRunning);
        }
        let node =
            transaction.allocate_function_node(name, None, scope.unwrap_or(DEFAULT_SCOPE))?;
        Ok(CallSpan {
            transaction: Arc::clone(transaction),
            node,
            previous: None,
            significant,
            started: false,
            stopped: false,
        })
    }

    /// Whether this span is backed by a real trace node.
    pub fn is_recording(&self) -> bool {
        self.node.is_some()
    }

    /// Record the start timestamp and become the transaction's current
    /// node. At most one start per span; repeats are no-ops.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let Some(node) = self.node else {
            return;
        };
        let now = self.transaction.elapsed();
        match self
            .transaction
            .with_tree(|tree| tree.record_start_and_push_current(node, now))
        {
            Ok(previous) => self.previous = Some(previous),
            Err(error) => {
                diagnostics::report_unraisable("call span start", &error);
                self.node = None;
            }
        }
    }

    /// Record the stop timestamp, restore the saved cursor, and either
    /// discard or persist the node.
    ///
    /// Idempotent: repeat calls do nothing. The error payload is
    /// accepted for interface parity and currently goes unrecorded.
    // TODO: attach the error payload to the node once per-node error
    // detail is part of the report format.
    pub fn stop(&mut self, error: Option<&CallError>) {
        let _ = error;
        if self.stopped {
            return;
        }
        self.stopped = true;
        if !self.started {
            return;
        }
        let (Some(node), Some(previous)) = (self.node, self.previous) else {
            return;
        };
        let now = self.transaction.elapsed();
        let significant = self.significant;
        let threshold = self.transaction.settings().node_threshold;
        let outcome = self.transaction.with_tree(|tree| {
            tree.record_stop_and_pop_current(node, previous, now)?;
            if !tree.discard_if_not_slow_enough(node, significant, threshold)? {
                tree.convert_to_persisted(node)?;
            }
            Ok(())
        });
        if let Err(error) = outcome {
            diagnostics::report_unraisable("call span stop", &error);
        }
        self.previous = None;
    }
}

impl Drop for CallSpan {
    /// A started span that was never stopped closes here, so an early
    /// return or panic in the instrumented call cannot leak an open
    /// node.
    fn drop(&mut self) {
        if self.started && !self.stopped {
            self.stop(None);
        }
    }
}
