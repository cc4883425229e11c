// ============================================================================
// spark-state - Type Definitions
// Listener signatures, notification outcomes, and value slots
// ============================================================================

use std::rc::Rc;
use std::sync::Arc;

use super::error::NotifyError;
use super::key::ListenerKey;

// =============================================================================
// LISTENER SIGNATURES
// =============================================================================

/// A listener on a single-threaded [`State`](crate::State).
///
/// Called with `(current, previous)`; either may be `None` when the container
/// was created empty.
pub type Listener<T> = Rc<dyn Fn(Option<&T>, Option<&T>)>;

/// A listener on a thread-safe [`SharedState`](crate::SharedState).
pub type SharedListener<T> = Arc<dyn Fn(Option<&T>, Option<&T>) + Send + Sync>;

/// Side channel receiving every listener failure a container observes.
pub type FailureHook = Arc<dyn Fn(&ListenerFailure) + Send + Sync>;

// =============================================================================
// NOTIFICATION OUTCOMES
// =============================================================================

/// A listener that panicked while being notified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub key: ListenerKey,
    pub message: String,
}

/// Outcome of one notification pass.
///
/// A pass always runs every listener it captured; failures are collected here
/// instead of aborting the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    notified: usize,
    failures: Vec<ListenerFailure>,
    completion_failure: Option<String>,
}

impl NotifyReport {
    pub(crate) fn new(notified: usize, failures: Vec<ListenerFailure>) -> Self {
        Self {
            notified,
            failures,
            completion_failure: None,
        }
    }

    pub(crate) fn set_completion_failure(&mut self, message: String) {
        self.completion_failure = Some(message);
    }

    /// Number of listeners invoked, failed ones included.
    pub fn notified(&self) -> usize {
        self.notified
    }

    pub fn failures(&self) -> &[ListenerFailure] {
        &self.failures
    }

    /// True when no listener panicked.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Panic message of the update's completion callback, if it panicked.
    ///
    /// Not a listener failure: it does not affect [`is_clean`](Self::is_clean)
    /// or [`into_result`](Self::into_result).
    pub fn completion_failure(&self) -> Option<&str> {
        self.completion_failure.as_deref()
    }

    /// `Ok(notified)` for a clean pass, otherwise the collected failures.
    pub fn into_result(self) -> Result<usize, NotifyError> {
        if self.failures.is_empty() {
            Ok(self.notified)
        } else {
            Err(NotifyError::ListenersPanicked {
                failures: self.failures,
                notified: self.notified,
            })
        }
    }
}

// =============================================================================
// VALUE SLOTS
// =============================================================================

/// Current and previous value of a container.
///
/// `P` is the shared pointer (`Rc` or `Arc`) so a notification pass can hold
/// the pair without cloning `T` or keeping the container borrowed.
#[derive(Debug)]
pub(crate) struct Values<P> {
    pub current: Option<P>,
    pub previous: Option<P>,
}

impl<P: Clone> Values<P> {
    pub fn new(initial: Option<P>) -> Self {
        Self {
            previous: initial.clone(),
            current: initial,
        }
    }

    /// Shift current into previous and store `next`.
    pub fn push(&mut self, next: P) {
        self.previous = self.current.replace(next);
    }

    pub fn pair(&self) -> (Option<P>, Option<P>) {
        (self.current.clone(), self.previous.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================
