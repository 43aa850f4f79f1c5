//! Comprehensive property-based tests for pre-commit hook
//!
//! Exercises the wrapper and trace invariants over generated inputs
//! with proptest. Designed to run fast enough for a pre-commit gate.
//!
//! Core properties tested:
//! 1. Wrapped calls are outcome-identical to unwrapped calls
//! 2. Literal trace names always win over callable identity
//! 3. Every start is matched by exactly one stop, at any nesting depth
//! 4. Stop is idempotent no matter how often it is repeated
//! 5. Error kind and message survive the wrapper boundary
//! 6. A zero threshold keeps every finished node
//! 7. Reports survive a JSON round trip

use proptest::prelude::*;
use std::sync::Arc;

use envolver::callable::{Callable, NativeFunction};
use envolver::instrument::{function_trace, wrap};
use envolver::report::TraceReport;
use envolver::transaction::{Transaction, TransactionSettings};
use envolver::value::{CallArgs, CallError, Value};

fn summing_target() -> Arc<dyn Callable> {
    NativeFunction::new("sum", |args| {
        let total: i64 = args.args().iter().filter_map(Value::as_int).sum();
        Ok(Value::Int(total))
    })
    .build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_wrapped_call_outcome_identical(values in prop::collection::vec(-1000i64..1000, 0..8)) {
        // Property: with no transaction running, wrapping changes nothing
        // about the call outcome.
        let target = summing_target();
        let wrapper = wrap(Arc::clone(&target));

        let args = CallArgs::positional(values);
        prop_assert_eq!(wrapper.invoke(&args), target.invoke(&args));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_literal_name_always_wins(name in "[a-zA-Z_][a-zA-Z0-9_/]{0,24}") {
        // Property: a literal trace name appears verbatim in the report,
        // whatever the callable is called.
        let txn = Transaction::with_settings("txn", TransactionSettings::keep_everything());
        let active = txn.activate().expect("activate");

        let wrapper = function_trace()
            .with_name(name.as_str())
            .apply(summing_target());
        wrapper.invoke(&CallArgs::new()).expect("runs");

        active.finish();
        let report = TraceReport::from_transaction(&txn).expect("finished");
        prop_assert!(report.find(&name).is_some());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_balanced_open_close_at_any_depth(depth in 1usize..8) {
        // Property: nested wrapped calls leave the cursor balanced and
        // record exactly one stop per start.
        let txn = Transaction::with_settings("txn", TransactionSettings::keep_everything());
        let active = txn.activate().expect("activate");

        let mut chain: Arc<dyn Callable> =
            NativeFunction::new("leaf", |_| Ok(Value::None)).build();
        for level in 0..depth {
            let inner = wrap(Arc::clone(&chain));
            let inner_dyn: Arc<dyn Callable> = inner;
            let captured = Arc::clone(&inner_dyn);
            chain = NativeFunction::new(&format!("level_{}", level), move |args| {
                captured.invoke(args)
            })
            .build();
        }
        wrap(chain).invoke(&CallArgs::new()).expect("runs");

        prop_assert_eq!(txn.open_node_depth(), 0);
        let stats = txn.tree_stats().expect("real transaction");
        prop_assert_eq!(stats.started, stats.finished);
        prop_assert_eq!(stats.started, depth + 1);
        active.finish();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_stop_idempotent(repeats in 1usize..10) {
        // Property: stopping a span N times has the effect of stopping
        // it once.
        use envolver::call_span::CallSpan;

        let txn = Transaction::with_settings("txn", TransactionSettings::keep_everything());
        let active = txn.activate().expect("activate");

        let mut span = CallSpan::new(&txn, "once", None, true).expect("running");
        span.start();
        for _ in 0..repeats {
            span.stop(None);
        }

        let stats = txn.tree_stats().expect("real transaction");
        prop_assert_eq!(stats.finished, 1);
        prop_assert_eq!(stats.persisted, 1);
        prop_assert_eq!(txn.open_node_depth(), 0);
        active.finish();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_error_survives_boundary(
        kind in "[A-Z][a-zA-Z]{2,15}Error",
        message in ".{0,40}",
    ) {
        // Property: the error a caller sees is the error the target
        // raised, with a node still opened and closed around it.
        let txn = Transaction::with_settings("txn", TransactionSettings::keep_everything());
        let active = txn.activate().expect("activate");

        let expected = CallError::new(&kind, &message);
        let raised = expected.clone();
        let target = NativeFunction::new("fails", move |_| Err(raised.clone())).build();

        let err = wrap(target).invoke(&CallArgs::new()).unwrap_err();
        prop_assert_eq!(err, expected);
        prop_assert_eq!(txn.open_node_depth(), 0);
        prop_assert_eq!(txn.tree_stats().expect("real transaction").finished, 1);
        active.finish();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_zero_threshold_keeps_all_nodes(calls in 1usize..20) {
        // Property: with the threshold at zero nothing is discarded,
        // significant or not.
        let txn = Transaction::with_settings("txn", TransactionSettings::keep_everything());
        let active = txn.activate().expect("activate");

        let wrapper = function_trace()
            .with_significant(false)
            .apply(summing_target());
        for _ in 0..calls {
            wrapper.invoke(&CallArgs::new()).expect("runs");
        }

        let stats = txn.tree_stats().expect("real transaction");
        prop_assert_eq!(stats.persisted, calls);
        prop_assert_eq!(stats.discarded, 0);
        active.finish();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_report_json_round_trip(names in prop::collection::vec("[a-z][a-z0-9_]{0,12}", 1..6)) {
        // Property: serializing and parsing a report preserves its
        // structure for arbitrary node names.
        let txn = Transaction::with_settings("txn", TransactionSettings::keep_everything());
        let active = txn.activate().expect("activate");

        for name in &names {
            let wrapper = function_trace().with_name(name.as_str()).apply(summing_target());
            wrapper.invoke(&CallArgs::new()).expect("runs");
        }

        active.finish();
        let report = TraceReport::from_transaction(&txn).expect("finished");
        let json = report.to_json().expect("serializes");
        let parsed: TraceReport = serde_json::from_str(&json).expect("parses");

        prop_assert_eq!(parsed.node_count(), names.len());
        for name in &names {
            prop_assert!(parsed.find(name).is_some());
        }
    }
}
