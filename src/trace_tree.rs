//! Transaction trace tree.
//!
//! Nodes are arena-allocated and transient until explicitly persisted.
//! A cursor tracks the innermost open node so nested calls attach to
//! the right parent; timed nodes that finish too fast are discarded
//! instead of persisted, which keeps deep instrumentation from
//! flooding a trace with noise.
//!
//! All timestamps are offsets from the owning transaction's start, so
//! the tree itself is deterministic and clock-free.

use std::time::Duration;

use crate::transaction::TraceError;

/// Handle to a node in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root node, representing the transaction itself.
    pub const ROOT: NodeId = NodeId(0);
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single timed node.
#[derive(Debug, Clone)]
pub struct TraceNode {
    name: String,
    scope: String,
    class_name: Option<String>,
    start: Option<Duration>,
    stop: Option<Duration>,
    parent: NodeId,
    children: Vec<NodeId>,
    persisted: bool,
}

impl TraceNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn start(&self) -> Option<Duration> {
        self.start
    }

    pub fn stop(&self) -> Option<Duration> {
        self.stop
    }

    /// Wall time between start and stop, once both are recorded.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Some(stop.saturating_sub(start)),
            _ => None,
        }
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Persisted children, in completion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }
}

/// Allocation and retention counters for one tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub allocated: usize,
    pub started: usize,
    pub finished: usize,
    pub persisted: usize,
    pub discarded: usize,
}

/// The tree: arena slots, cursor, counters.
#[derive(Debug)]
pub struct TraceTree {
    slots: Vec<Option<TraceNode>>,
    current: NodeId,
    stats: TreeStats,
}

impl TraceTree {
    /// Create a tree whose root carries the transaction name. The root
    /// is persisted from the start and opens at offset zero.
    pub fn new(root_name: &str) -> Self {
        let root = TraceNode {
            name: root_name.to_string(),
            scope: "Transaction".to_string(),
            class_name: None,
            start: Some(Duration::ZERO),
            stop: None,
            parent: NodeId::ROOT,
            children: Vec::new(),
            persisted: true,
        };
        TraceTree {
            slots: vec![Some(root)],
            current: NodeId::ROOT,
            stats: TreeStats::default(),
        }
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    /// Nesting depth of the cursor below the root. Zero means no node
    /// is open.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut at = self.current;
        while at != NodeId::ROOT {
            depth += 1;
            match self.node(at) {
                Some(node) => at = node.parent(),
                None => break,
            }
        }
        depth
    }

    pub fn node(&self, id: NodeId) -> Option<&TraceNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TraceNode, TraceError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TraceError::NodeVacated(id))
    }

    /// Allocate a transient function node under the current cursor.
    pub fn allocate_function_node(
        &mut self,
        name: &str,
        class_name: Option<&str>,
        scope: &str,
    ) -> NodeId {
        let node = TraceNode {
            name: name.to_string(),
            scope: scope.to_string(),
            class_name: class_name.map(str::to_string),
            start: None,
            stop: None,
            parent: self.current,
            children: Vec::new(),
            persisted: false,
        };
        self.slots.push(Some(node));
        self.stats.allocated += 1;
        NodeId(self.slots.len() - 1)
    }

    /// Record the start timestamp and make `id` the cursor. Returns the
    /// previous cursor so the caller can restore it on stop.
    pub fn record_start_and_push_current(
        &mut self,
        id: NodeId,
        now: Duration,
    ) -> Result<NodeId, TraceError> {
        let node = self.node_mut(id)?;
        node.start = Some(now);
        let previous = self.current;
        self.current = id;
        self.stats.started += 1;
        Ok(previous)
    }

    /// Record the stop timestamp and restore the saved cursor.
    pub fn record_stop_and_pop_current(
        &mut self,
        id: NodeId,
        previous: NodeId,
        now: Duration,
    ) -> Result<(), TraceError> {
        let node = self.node_mut(id)?;
        node.stop = Some(now);
        self.current = previous;
        self.stats.finished += 1;
        Ok(())
    }

    /// Drop a finished node that is neither significant nor slow enough
    /// to keep. Returns true when the node was discarded.
    ///
    /// A node that already owns persisted children is always kept,
    /// whatever its own duration, so the children stay reachable.
    pub fn discard_if_not_slow_enough(
        &mut self,
        id: NodeId,
        significant: bool,
        threshold: Duration,
    ) -> Result<bool, TraceError> {
        if significant {
            return Ok(false);
        }
        let node = self.node_mut(id)?;
        if !node.children.is_empty() {
            return Ok(false);
        }
        let duration = node.duration().unwrap_or(Duration::ZERO);
        if duration >= threshold {
            return Ok(false);
        }
        self.slots[id.0] = None;
        self.stats.discarded += 1;
        Ok(true)
    }

    /// Promote a finished node to persisted, attaching it to its
    /// parent's child list.
    pub fn convert_to_persisted(&mut self, id: NodeId) -> Result<(), TraceError> {
        let parent = {
            let node = self.node_mut(id)?;
            node.persisted = true;
            node.parent
        };
        self.node_mut(parent)?.children.push(id);
        self.stats.persisted += 1;
        Ok(())
    }

    /// Record the root's stop timestamp when the transaction finishes.
    pub fn close_root(&mut self, now: Duration) {
        if let Some(root) = self.slots.get_mut(NodeId::ROOT.0).and_then(Option::as_mut) {
            root.stop = Some(now);
        }
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }
}
