//! Error capture across wrapper boundaries.

use std::sync::Arc;

use envolver::callable::{Callable, NativeFunction};
use envolver::error_trace::error_trace;
use envolver::instrument::wrap;
use envolver::report::TraceReport;
use envolver::transaction::{Transaction, TransactionSettings};
use envolver::value::{CallArgs, CallError, Value};

fn failing(kind: &'static str, message: &'static str) -> Arc<dyn Callable> {
    NativeFunction::new("risky", move |_| Err(CallError::new(kind, message)))
        .with_module("billing")
        .build()
}

#[test]
fn test_recorded_error_lands_in_report() {
    let txn = Transaction::new("checkout");
    let active = txn.activate().expect("activate");

    let wrapper = error_trace().apply(failing("CardDeclined", "insufficient funds"));
    let err = wrapper.invoke(&CallArgs::new()).unwrap_err();
    assert_eq!(err.kind(), "CardDeclined");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "CardDeclined");
    assert_eq!(report.errors[0].message, "insufficient funds");
}

#[test]
fn test_ignore_list_filters_by_kind() {
    let txn = Transaction::new("checkout");
    let active = txn.activate().expect("activate");

    let config = error_trace().ignoring("Retryable").ignoring("Timeout");
    config
        .apply(failing("Retryable", "try again"))
        .invoke(&CallArgs::new())
        .unwrap_err();
    config
        .apply(failing("Fatal", "gone"))
        .invoke(&CallArgs::new())
        .unwrap_err();

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "Fatal");
}

#[test]
fn test_error_trace_stacks_with_function_trace() {
    let txn = Transaction::with_settings("checkout", TransactionSettings::keep_everything());
    let active = txn.activate().expect("activate");

    // Timing wrapper outside, error recording inside.
    let inner: Arc<dyn Callable> = error_trace().apply(failing("CardDeclined", "no"));
    let outer = wrap(inner);

    let err = outer.invoke(&CallArgs::new()).unwrap_err();
    assert_eq!(err.kind(), "CardDeclined");

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert!(report.find("billing:risky").is_some(), "call was timed");
    assert_eq!(report.errors.len(), 1, "and the error was recorded");
}

#[test]
fn test_each_failing_call_recorded_separately() {
    let txn = Transaction::new("checkout");
    let active = txn.activate().expect("activate");

    let wrapper = error_trace().apply(failing("CardDeclined", "no"));
    wrapper.invoke(&CallArgs::new()).unwrap_err();
    wrapper.invoke(&CallArgs::new()).unwrap_err();

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert_eq!(report.errors.len(), 2);
}

#[test]
fn test_no_transaction_means_no_recording() {
    let wrapper = error_trace().apply(failing("CardDeclined", "no"));
    let err = wrapper.invoke(&CallArgs::new()).unwrap_err();
    // The error itself still surfaces unchanged.
    assert_eq!(err, CallError::new("CardDeclined", "no"));
}

#[test]
fn test_successful_calls_pass_clean() {
    let txn = Transaction::new("checkout");
    let active = txn.activate().expect("activate");

    let fine = NativeFunction::new("fine", |_| Ok(Value::Int(200))).build();
    let out = error_trace().apply(fine).invoke(&CallArgs::new());
    assert_eq!(out, Ok(Value::Int(200)));

    active.finish();
    let report = TraceReport::from_transaction(&txn).expect("finished");
    assert!(report.errors.is_empty());
}
