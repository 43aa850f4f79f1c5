//! Serializable snapshots of finished transactions.
//!
//! A [`TraceReport`] is the stable, tool-facing view of a trace:
//! persisted nodes in tree order, captured errors, and retention
//! counters, with every timestamp flattened to microseconds. Reports
//! are only available once the transaction has finished, so they never
//! observe a tree mid-flight.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::trace_tree::{NodeId, TraceTree};
use crate::transaction::{RecordedError, TraceError, Transaction, TransactionState};

/// Format tag embedded in every report.
pub const REPORT_FORMAT: &str = "envolver-trace-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    pub format: String,
    pub version: String,
    pub transaction: String,
    pub duration_us: u64,
    pub nodes: Vec<ReportNode>,
    pub errors: Vec<RecordedError>,
    pub summary: ReportSummary,
}

/// One persisted node, children nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportNode {
    pub name: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub start_us: u64,
    pub duration_us: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ReportNode>,
}

/// Retention counters for the whole trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub allocated: usize,
    pub persisted: usize,
    pub discarded: usize,
}

impl TraceReport {
    /// Snapshot a finished transaction.
    ///
    /// Fails with [`TraceError::NotFinished`] while the transaction is
    /// pending or running. Dummy transactions produce an empty but
    /// valid report.
    pub fn from_transaction(transaction: &Transaction) -> Result<TraceReport, TraceError> {
        if transaction.state() != TransactionState::Finished {
            return Err(TraceError::NotFinished);
        }
        let duration = transaction.duration().unwrap_or(Duration::ZERO);
        let (nodes, summary) = if transaction.is_dummy() {
            (Vec::new(), ReportSummary::default())
        } else {
            transaction.with_tree(|tree| {
                let root = tree
                    .node(NodeId::ROOT)
                    .ok_or(TraceError::NodeVacated(NodeId::ROOT))?;
                let nodes: Vec<ReportNode> = root
                    .children()
                    .iter()
                    .filter_map(|&id| collect_node(tree, id))
                    .collect();
                let stats = tree.stats();
                Ok((
                    nodes,
                    ReportSummary {
                        allocated: stats.allocated,
                        persisted: stats.persisted,
                        discarded: stats.discarded,
                    },
                ))
            })?
        };
        Ok(TraceReport {
            format: REPORT_FORMAT.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transaction: transaction.name().to_string(),
            duration_us: duration.as_micros() as u64,
            nodes,
            errors: transaction.recorded_errors(),
            summary,
        })
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Indented text rendering, one line per node.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({} us)", self.transaction, self.duration_us);
        for node in &self.nodes {
            render_node(node, 1, &mut out);
        }
        for error in &self.errors {
            let _ = writeln!(out, "  ! {}: {}", error.kind, error.message);
        }
        out
    }

    /// Total persisted nodes across the whole tree.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(count_subtree).sum()
    }

    /// Depth-first search by node name.
    pub fn find(&self, name: &str) -> Option<&ReportNode> {
        find_in(&self.nodes, name)
    }
}

fn collect_node(tree: &TraceTree, id: NodeId) -> Option<ReportNode> {
    let node = tree.node(id)?;
    Some(ReportNode {
        name: node.name().to_string(),
        scope: node.scope().to_string(),
        class_name: node.class_name().map(str::to_string),
        start_us: node.start().unwrap_or(Duration::ZERO).as_micros() as u64,
        duration_us: node.duration().unwrap_or(Duration::ZERO).as_micros() as u64,
        children: node
            .children()
            .iter()
            .filter_map(|&child| collect_node(tree, child))
            .collect(),
    })
}

fn render_node(node: &ReportNode, depth: usize, out: &mut String) {
    let _ = writeln!(
        out,
        "{}{} [{}] {} us",
        "  ".repeat(depth),
        node.name,
        node.scope,
        node.duration_us
    );
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

fn count_subtree(node: &ReportNode) -> usize {
    1 + node.children.iter().map(count_subtree).sum::<usize>()
}

fn find_in<'a>(nodes: &'a [ReportNode], name: &str) -> Option<&'a ReportNode> {
    for node in nodes {
        if node.name == name {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, name) {
            return Some(found);
        }
    }
    None
}
