//! Trace capture through wrapped calls.
//!
//! Each call through a trace wrapper while a transaction runs must
//! open exactly one node, close it exactly once whatever the call
//! outcome, and attach it at the cursor's position in the tree.

use std::sync::Arc;

use envolver::callable::{Callable, NativeFunction};
use envolver::instrument::{function_trace, wrap};
use envolver::report::TraceReport;
use envolver::transaction::{Transaction, TransactionSettings};
use envolver::value::{CallArgs, CallError, Value};

fn step(name: &str) -> Arc<dyn Callable> {
    NativeFunction::new(name, |_| Ok(Value::None))
        .with_module("pipeline")
        .build()
}

fn keep_everything(name: &str) -> Arc<Transaction> {
    Transaction::with_settings(name, TransactionSettings::keep_everything())
}

#[test]
fn test_wrapped_call_records_derived_name_and_default_scope() {
    let txn = keep_everything("job");
    let active = txn.activate().expect("activate");

    wrap(step("ingest")).invoke(&CallArgs::new()).expect("runs");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.node_count(), 1);

    let node = report.find("pipeline:ingest").expect("node recorded");
    assert_eq!(node.scope, "Function");
}

#[test]
fn test_balanced_open_close_per_call() {
    let txn = keep_everything("job");
    let active = txn.activate().expect("activate");

    let wrapper = wrap(step("ingest"));
    for _ in 0..5 {
        wrapper.invoke(&CallArgs::new()).expect("runs");
        assert_eq!(txn.open_node_depth(), 0, "cursor returns after every call");
    }

    let stats = txn.tree_stats().expect("real transaction");
    assert_eq!(stats.started, 5);
    assert_eq!(stats.finished, 5);
    active.finish();
}

#[test]
fn test_error_closes_node_and_surfaces_unchanged() {
    let txn = keep_everything("job");
    let active = txn.activate().expect("activate");

    let target =
        NativeFunction::new("parse", |_| Err(CallError::value_error("bad input"))).build();
    let err = wrap(target).invoke(&CallArgs::new()).unwrap_err();

    assert_eq!(err, CallError::value_error("bad input"));
    assert_eq!(txn.open_node_depth(), 0);

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert!(report.find("parse").is_some(), "failed call is still timed");
}

#[test]
fn test_calls_without_transaction_leave_no_trace() {
    let wrapper = wrap(step("early"));
    wrapper.invoke(&CallArgs::new()).expect("runs untraced");

    let txn = keep_everything("job");
    let active = txn.activate().expect("activate");
    active.finish();

    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.node_count(), 0);
}

#[test]
fn test_dummy_transaction_runs_calls_untraced() {
    let txn = Transaction::dummy("disabled");
    let active = txn.activate().expect("activate");

    let out = wrap(step("work")).invoke(&CallArgs::new());
    assert_eq!(out, Ok(Value::None));

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.node_count(), 0);
}

#[test]
fn test_nested_wrapped_calls_produce_nested_nodes() {
    let txn = keep_everything("job");
    let active = txn.activate().expect("activate");

    let inner: Arc<dyn Callable> = wrap(step("load_rows"));
    let inner_captured = Arc::clone(&inner);
    let outer_target = NativeFunction::new("run_batch", move |args| {
        inner_captured.invoke(args)?;
        inner_captured.invoke(args)
    })
    .with_module("pipeline")
    .build();

    wrap(outer_target).invoke(&CallArgs::new()).expect("runs");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");

    let outer = report.find("pipeline:run_batch").expect("outer node");
    assert_eq!(outer.children.len(), 2);
    assert!(outer
        .children
        .iter()
        .all(|child| child.name == "pipeline:load_rows"));
}

#[test]
fn test_sequential_calls_attach_in_order() {
    let txn = keep_everything("job");
    let active = txn.activate().expect("activate");

    wrap(step("first")).invoke(&CallArgs::new()).expect("runs");
    wrap(step("second")).invoke(&CallArgs::new()).expect("runs");
    wrap(step("third")).invoke(&CallArgs::new()).expect("runs");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    let names: Vec<&str> = report.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(
        names,
        ["pipeline:first", "pipeline:second", "pipeline:third"]
    );
}

#[test]
fn test_insignificant_fast_call_is_pruned() {
    // Default settings: instant calls below the threshold drop out.
    let txn = Transaction::new("job");
    let active = txn.activate().expect("activate");

    let wrapper = function_trace()
        .with_significant(false)
        .apply(step("hot_loop_body"));
    wrapper.invoke(&CallArgs::new()).expect("runs");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.node_count(), 0);
    assert_eq!(report.summary.discarded, 1);
    assert_eq!(report.summary.allocated, 1);
}

#[test]
fn test_significant_fast_call_is_kept() {
    let txn = Transaction::new("job");
    let active = txn.activate().expect("activate");

    wrap(step("must_see")).invoke(&CallArgs::new()).expect("runs");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.summary.persisted, 1);
    assert!(report.find("pipeline:must_see").is_some());
}

#[test]
fn test_trace_resumes_after_failed_call() {
    let txn = keep_everything("job");
    let active = txn.activate().expect("activate");

    let failing =
        NativeFunction::new("flaky", |_| Err(CallError::runtime_error("transient"))).build();
    wrap(failing).invoke(&CallArgs::new()).unwrap_err();
    wrap(step("recovery")).invoke(&CallArgs::new()).expect("runs");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    // Both calls are siblings under the root; the failure did not
    // leave the cursor stuck inside the flaky node.
    assert_eq!(report.nodes.len(), 2);
    assert_eq!(report.nodes[0].name, "flaky");
    assert_eq!(report.nodes[1].name, "pipeline:recovery");
    assert!(report.nodes[1].children.is_empty());
}
