// ============================================================================
// spark-state - Notification Pass
//
// Runs a captured list of listeners one after another. Each call is isolated
// with catch_unwind: a panicking listener is recorded and the pass moves on.
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::key::ListenerKey;
use crate::core::types::{FailureHook, ListenerFailure, NotifyReport};

// =============================================================================
// FAILURE REPORTING
// =============================================================================

/// Where a container reports listener failures.
#[derive(Clone, Copy)]
pub(crate) struct FailureSink<'a> {
    pub label: Option<&'a str>,
    pub hook: Option<&'a FailureHook>,
}

impl FailureSink<'_> {
    fn report(&self, failure: &ListenerFailure) {
        tracing::warn!(
            state = self.label.unwrap_or("<unlabeled>"),
            key = %failure.key,
            message = %failure.message,
            "listener panicked during notification"
        );
        if let Some(hook) = self.hook {
            // A panicking hook must not take the pass down with it
            if catch_unwind(AssertUnwindSafe(|| hook(failure))).is_err() {
                tracing::warn!(key = %failure.key, "failure hook panicked");
            }
        }
    }
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// INVOCATION
// =============================================================================

/// Invoke one listener, isolating a panic.
pub(crate) fn invoke_isolated(
    key: ListenerKey,
    sink: FailureSink<'_>,
    call: impl FnOnce(),
) -> Option<ListenerFailure> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => None,
        Err(payload) => {
            let failure = ListenerFailure {
                key,
                message: panic_message(payload.as_ref()),
            };
            sink.report(&failure);
            Some(failure)
        }
    }
}

/// Run an update's completion callback, isolating a panic.
///
/// A panic is logged and returned as its message.
pub(crate) fn complete_isolated(sink: FailureSink<'_>, done: impl FnOnce()) -> Option<String> {
    let payload = catch_unwind(AssertUnwindSafe(done)).err()?;
    let message = panic_message(payload.as_ref());
    tracing::warn!(
        state = sink.label.unwrap_or("<unlabeled>"),
        message = %message,
        "completion callback panicked"
    );
    Some(message)
}

/// Invoke every captured listener in order.
///
/// `call` receives each listener; the caller closes over the value pair so
/// every listener in the pass sees the same `(current, previous)`.
pub(crate) fn run_pass<L>(
    listeners: &[(ListenerKey, L)],
    sink: FailureSink<'_>,
    mut call: impl FnMut(&L),
) -> NotifyReport {
    let mut failures = Vec::new();
    for (key, listener) in listeners {
        if let Some(failure) = invoke_isolated(*key, sink, || call(listener)) {
            failures.push(failure);
        }
    }
    NotifyReport::new(listeners.len(), failures)
}

// =============================================================================
// TESTS
// =============================================================================
