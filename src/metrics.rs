//! Metric helpers for `nlmux`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking messages claimed by a listener.
pub const MESSAGES_DISPATCHED: &str = "nlmux_messages_dispatched_total";
/// Name of the counter tracking messages no listener claimed.
pub const MESSAGES_UNCLAIMED: &str = "nlmux_messages_unclaimed_total";
/// Name of the counter tracking batches abandoned on a framing error.
pub const DECODE_ERRORS: &str = "nlmux_decode_errors_total";
/// Name of the counter tracking panics raised by listeners.
pub const LISTENER_PANICS: &str = "nlmux_listener_panics_total";
/// Name of the counter tracking finished client calls.
pub const CALLS_COMPLETED: &str = "nlmux_calls_total";

/// Outcome of a client call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The kernel acknowledged the request or finished the dump.
    Ok,
    /// The kernel answered with an error status.
    KernelError,
    /// The call failed locally before a terminal reply arrived.
    Failed,
}

impl Outcome {
    #[cfg_attr(
        not(feature = "metrics"),
        expect(dead_code, reason = "labels are only read by the recorder")
    )]
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::KernelError => "kernel_error",
            Outcome::Failed => "failed",
        }
    }
}

/// Record a message claimed by a listener.
pub fn inc_dispatched() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DISPATCHED).increment(1);
}

/// Record a message dropped because no listener claimed it.
pub fn inc_unclaimed() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_UNCLAIMED).increment(1);
}

/// Record a batch cut short by a decode error.
pub fn inc_decode_errors() {
    #[cfg(feature = "metrics")]
    counter!(DECODE_ERRORS).increment(1);
}

/// Record a panic caught while dispatching a batch.
pub fn inc_listener_panics() {
    #[cfg(feature = "metrics")]
    counter!(LISTENER_PANICS).increment(1);
}

/// Record a finished client call.
pub fn inc_calls(outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(CALLS_COMPLETED, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}
