//! Transaction lifecycle and the thread-scoped current transaction.
//!
//! A transaction owns one trace tree and moves through three states:
//! pending, running, finished. While running it sits on a thread-local
//! stack so instrumentation deep in a call chain can find it without
//! threading a handle through every signature. Dummy transactions keep
//! the same lifecycle but record nothing, which lets wrapped code run
//! unchanged when tracing is disabled.

use std::cell::RefCell;
use std::env;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace_tree::{NodeId, TraceTree, TreeStats};
use crate::value::CallError;

/// Environment variable overriding the node retention threshold, in
/// microseconds.
pub const NODE_THRESHOLD_ENV: &str = "ENVOLVER_NODE_THRESHOLD_US";

const DEFAULT_NODE_THRESHOLD: Duration = Duration::from_millis(2);

/// Instrumentation-plane errors.
///
/// These never cross a wrapped call boundary as application errors; the
/// wrapper layer either reports them before invoking the target or
/// swallows them through the unraisable channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("transaction not active")]
    NotRunning,
    #[error("transaction already started")]
    AlreadyStarted,
    #[error("transaction not finished")]
    NotFinished,
    #[error("transaction records no trace state")]
    Untraced,
    #[error("trace node {0} is no longer allocated")]
    NodeVacated(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Running,
    Finished,
}

impl TransactionState {
    fn as_u8(self) -> u8 {
        match self {
            TransactionState::Pending => 0,
            TransactionState::Running => 1,
            TransactionState::Finished => 2,
        }
    }

    fn from_u8(raw: u8) -> TransactionState {
        match raw {
            0 => TransactionState::Pending,
            1 => TransactionState::Running,
            _ => TransactionState::Finished,
        }
    }
}

/// Tunable retention policy for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSettings {
    /// Minimum duration an insignificant node must reach to be kept in
    /// the trace.
    pub node_threshold: Duration,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        TransactionSettings {
            node_threshold: DEFAULT_NODE_THRESHOLD,
        }
    }
}

impl TransactionSettings {
    /// Zero threshold: every finished node is persisted. Useful for
    /// tests and short demos where nothing is slow.
    pub fn keep_everything() -> Self {
        TransactionSettings {
            node_threshold: Duration::ZERO,
        }
    }

    /// Read settings from the environment, falling back to defaults
    /// for unset or unparseable values.
    pub fn from_env() -> Self {
        let mut settings = TransactionSettings::default();
        if let Ok(raw) = env::var(NODE_THRESHOLD_ENV) {
            match raw.parse::<u64>() {
                Ok(us) => settings.node_threshold = Duration::from_micros(us),
                Err(_) => {
                    tracing::warn!(
                        target: "envolver",
                        variable = NODE_THRESHOLD_ENV,
                        value = %raw,
                        "ignoring unparseable node threshold"
                    );
                }
            }
        }
        settings
    }
}

/// An application error captured into the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: String,
    pub message: String,
}

impl From<&CallError> for RecordedError {
    fn from(error: &CallError) -> Self {
        RecordedError {
            kind: error.kind().to_string(),
            message: error.message().to_string(),
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Vec<Arc<Transaction>>> = const { RefCell::new(Vec::new()) };
}

/// One unit of traced work.
pub struct Transaction {
    name: String,
    dummy: bool,
    state: AtomicU8,
    begin: OnceLock<Instant>,
    total: OnceLock<Duration>,
    tree: Option<Mutex<TraceTree>>,
    errors: Mutex<Vec<RecordedError>>,
    settings: TransactionSettings,
}

impl Transaction {
    /// Create a pending transaction with default settings.
    pub fn new(name: &str) -> Arc<Self> {
        Transaction::with_settings(name, TransactionSettings::default())
    }

    pub fn with_settings(name: &str, settings: TransactionSettings) -> Arc<Self> {
        Arc::new(Transaction {
            name: name.to_string(),
            dummy: false,
            state: AtomicU8::new(TransactionState::Pending.as_u8()),
            begin: OnceLock::new(),
            total: OnceLock::new(),
            tree: Some(Mutex::new(TraceTree::new(name))),
            errors: Mutex::new(Vec::new()),
            settings,
        })
    }

    /// Create a dummy transaction: full lifecycle, no recording. Trace
    /// handles opened against it degrade to no-ops.
    pub fn dummy(name: &str) -> Arc<Self> {
        Arc::new(Transaction {
            name: name.to_string(),
            dummy: true,
            state: AtomicU8::new(TransactionState::Pending.as_u8()),
            begin: OnceLock::new(),
            total: OnceLock::new(),
            tree: None,
            errors: Mutex::new(Vec::new()),
            settings: TransactionSettings::default(),
        })
    }

    /// The transaction at the top of this thread's stack, if any.
    pub fn current() -> Option<Arc<Transaction>> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TransactionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn settings(&self) -> &TransactionSettings {
        &self.settings
    }

    /// Time since activation. Zero before the transaction starts.
    pub fn elapsed(&self) -> Duration {
        self.begin.get().map(Instant::elapsed).unwrap_or(Duration::ZERO)
    }

    /// Total wall time, available once finished.
    pub fn duration(&self) -> Option<Duration> {
        self.total.get().copied()
    }

    /// Begin running: records the start instant and pushes this
    /// transaction onto the thread's stack. The returned guard pops
    /// and finishes it, on `finish()` or on drop.
    pub fn activate(self: &Arc<Self>) -> Result<ActiveTransaction, TraceError> {
        self.state
            .compare_exchange(
                TransactionState::Pending.as_u8(),
                TransactionState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| TraceError::AlreadyStarted)?;
        let _ = self.begin.set(Instant::now());
        CURRENT.with(|stack| stack.borrow_mut().push(Arc::clone(self)));
        Ok(ActiveTransaction {
            transaction: Arc::clone(self),
            finished: false,
            _not_send: PhantomData,
        })
    }

    /// Allocate a transient function node, or `None` for a dummy
    /// transaction.
    pub fn allocate_function_node(
        &self,
        name: &str,
        class_name: Option<&str>,
        scope: &str,
    ) -> Result<Option<NodeId>, TraceError> {
        match self.tree.as_ref() {
            None => Ok(None),
            Some(tree) => {
                let mut tree = tree.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(Some(tree.allocate_function_node(name, class_name, scope)))
            }
        }
    }

    pub(crate) fn with_tree<R>(
        &self,
        f: impl FnOnce(&mut TraceTree) -> Result<R, TraceError>,
    ) -> Result<R, TraceError> {
        let tree = self.tree.as_ref().ok_or(TraceError::Untraced)?;
        let mut tree = tree.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tree)
    }

    /// Allocation counters for the trace tree. `None` for dummies.
    pub fn tree_stats(&self) -> Option<TreeStats> {
        self.tree.as_ref().map(|tree| {
            tree.lock().unwrap_or_else(PoisonError::into_inner).stats()
        })
    }

    /// How many trace nodes are currently open. Zero once every start
    /// has been matched by a stop.
    pub fn open_node_depth(&self) -> usize {
        self.tree
            .as_ref()
            .map(|tree| tree.lock().unwrap_or_else(PoisonError::into_inner).depth())
            .unwrap_or(0)
    }

    /// Capture an application error observed while the transaction ran.
    pub fn notice_error(&self, error: &CallError) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        errors.push(RecordedError::from(error));
    }

    pub fn recorded_errors(&self) -> Vec<RecordedError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("name", &self.name)
            .field("dummy", &self.dummy)
            .field("state", &self.state())
            .finish()
    }
}

/// Guard for a running transaction.
///
/// Not `Send`: the guard must finish on the thread that activated the
/// transaction, because that thread's stack holds the entry.
#[derive(Debug)]
pub struct ActiveTransaction {
    transaction: Arc<Transaction>,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl ActiveTransaction {
    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }

    /// Finish now instead of at end of scope.
    pub fn finish(mut self) {
        self.finish_inner();
    }

    fn finish_inner(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack
                .iter()
                .rposition(|t| Arc::ptr_eq(t, &self.transaction))
            {
                stack.remove(pos);
            }
        });
        let elapsed = self.transaction.elapsed();
        if let Some(tree) = self.transaction.tree.as_ref() {
            tree.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .close_root(elapsed);
        }
        let _ = self.transaction.total.set(elapsed);
        self.transaction.set_state(TransactionState::Finished);
    }
}

impl Drop for ActiveTransaction {
    fn drop(&mut self) {
        self.finish_inner();
    }
}
