//! Envolver - Transparent call interception with transaction trace trees
//!
//! This library wraps dynamic callables so each call is timed into the
//! current transaction's trace tree, with full behavioral transparency:
//! metadata, attribute storage, binding, and call outcomes all pass
//! through unchanged. Wrappers double as error recorders and call hooks,
//! and finished transactions serialize to portable trace reports.

pub mod call_span;
pub mod callable;
pub mod diagnostics;
pub mod error_trace;
pub mod hooks;
pub mod instrument;
pub mod naming;
pub mod registry;
pub mod report;
pub mod trace_tree;
pub mod transaction;
pub mod value;
pub mod wrapper;
