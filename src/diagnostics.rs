//! Fail-safe reporting for instrumentation-internal errors.
//!
//! A wrapper must never let its own bookkeeping disturb the call it
//! wraps: once the target is committed to run, trace failures are
//! reported here and dropped rather than raised to the caller. This is
//! the error channel of last resort, so it only logs.

use std::fmt::Display;

/// Report an instrumentation error that cannot be raised to the caller.
///
/// `stage` names the point in the wrapper protocol where the failure
/// happened, e.g. `"function trace entry"`.
pub fn report_unraisable(stage: &str, error: &dyn Display) {
    tracing::error!(
        target: "envolver",
        stage,
        error = %error,
        "instrumentation failure suppressed"
    );
}
