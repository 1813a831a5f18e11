use sysrun_core::Outcome;

/// A call-stack breadcrumb trail attached to an outcome, for triage. Plain
/// strings rather than a structured backtrace, matching the original's
/// `callRecord` convention of short free-form frame descriptions.
pub type CallRecord = Vec<String>;

/// Raised by [`crate::ProcessUser::add_outcome`] (and the `assert_*`
/// helpers, and `abort` itself) when `abort_on_error` is set and the
/// outcome is failure-class.
///
/// This is the explicit-return-value realization of the "Exceptions for
/// control flow" design note: it is an ordinary `Result` error propagated
/// with `?` through a test's `setup`/`execute`/`validate`, not a panic. The
/// container boundary (`sysrun-container`) catches it and translates it into
/// the recorded outcome, exactly the way the original's `AbortExecution`
/// exception unwound to the nearest container frame.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{outcome}: {reason}")]
pub struct Abort {
    pub outcome: Outcome,
    pub reason: String,
    pub call_record: CallRecord,
}

impl Abort {
    pub fn new(outcome: Outcome, reason: impl Into<String>, call_record: CallRecord) -> Self {
        Self {
            outcome,
            reason: reason.into(),
            call_record,
        }
    }
}
