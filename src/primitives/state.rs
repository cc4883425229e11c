// ============================================================================
// spark-state - State Primitive
// Single-threaded observable value with synchronous notification
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::core::key::{KeySource, ListenerKey, SequentialKeys};
use crate::core::registry::Registry;
use crate::core::types::{FailureHook, Listener, ListenerFailure, NotifyReport, Values};
use crate::primitives::attachment::{Attachment, ListenerOwner};
use crate::reactivity::notify::{FailureSink, complete_isolated, invoke_isolated, run_pass};

// =============================================================================
// STATE OPTIONS
// =============================================================================

/// Options for creating a [`State`] or [`SharedState`](crate::SharedState).
///
/// # Example
///
/// ```
/// use spark_state::{RandomKeys, State, StateOptions};
///
/// let options = StateOptions::new()
///     .label("theme")
///     .key_source(RandomKeys::new())
///     .on_failure(|failure| eprintln!("listener {} failed", failure.key));
///
/// let theme = State::with_options(Some("dark"), options);
/// assert_eq!(theme.label(), Some("theme"));
/// ```
pub struct StateOptions<K = SequentialKeys> {
    pub(crate) label: Option<String>,
    pub(crate) key_source: K,
    pub(crate) on_failure: Option<FailureHook>,
}

impl StateOptions<SequentialKeys> {
    pub fn new() -> Self {
        Self {
            label: None,
            key_source: SequentialKeys::new(),
            on_failure: None,
        }
    }
}

impl Default for StateOptions<SequentialKeys> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KeySource> StateOptions<K> {
    /// Name included in tracing events from this container.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Replace the listener key strategy.
    pub fn key_source<K2: KeySource>(self, key_source: K2) -> StateOptions<K2> {
        StateOptions {
            label: self.label,
            key_source,
            on_failure: self.on_failure,
        }
    }

    /// Receive every listener failure, in addition to the tracing warning.
    pub fn on_failure(mut self, hook: impl Fn(&ListenerFailure) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }
}

// =============================================================================
// STATE INNER
// =============================================================================

struct StateInner<T, K> {
    values: RefCell<Values<Rc<T>>>,
    registry: RefCell<Registry<Listener<T>, K>>,
    label: Option<String>,
    on_failure: Option<FailureHook>,
}

impl<T, K> StateInner<T, K> {
    fn sink(&self) -> FailureSink<'_> {
        FailureSink {
            label: self.label.as_deref(),
            hook: self.on_failure.as_ref(),
        }
    }

    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unlabeled>")
    }
}

impl<T, K: KeySource> ListenerOwner for StateInner<T, K> {
    fn detach_key(&self, key: ListenerKey) -> bool {
        let removed = self.registry.borrow_mut().remove(key);
        tracing::trace!(state = self.label(), %key, removed, "detach");
        removed
    }

    fn has_key(&self, key: ListenerKey) -> bool {
        self.registry.borrow().contains(key)
    }
}

// =============================================================================
// STATE<T> - The public container handle
// =============================================================================

/// A single-threaded observable value.
///
/// Holds the current value and the one before it, and calls every attached
/// listener with `(current, previous)` on each [`update`](State::update).
/// Notification is synchronous: `update` returns after every listener ran.
///
/// Listeners are captured when `update` starts. A listener attached during a
/// pass is not called by that pass; one detached during a pass is never
/// called again afterwards. No borrow is held while a listener runs, so
/// listeners may attach, detach, read, or update the same state.
///
/// Cloning a `State` yields another handle to the same value.
///
/// # Example
///
/// ```
/// use spark_state::state;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let s = state(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let seen_clone = seen.clone();
/// let handle = s.attach(move |current, previous| {
///     seen_clone.borrow_mut().push((current.copied(), previous.copied()));
/// });
///
/// s.update(5);
/// handle.detach();
/// s.update(9);
///
/// assert_eq!(*seen.borrow(), vec![(Some(0), Some(0)), (Some(5), Some(0))]);
/// assert_eq!(s.value(), Some(9));
/// assert_eq!(s.previous_value(), Some(5));
/// ```
pub struct State<T, K = SequentialKeys> {
    inner: Rc<StateInner<T, K>>,
}

impl<T: 'static> State<T> {
    /// Create a state holding `value` as both current and previous value.
    pub fn new(value: T) -> Self {
        Self::from_option(Some(value))
    }

    /// Create a state with no value yet.
    pub fn empty() -> Self {
        Self::from_option(None)
    }

    pub fn from_option(initial: Option<T>) -> Self {
        Self::with_options(initial, StateOptions::new())
    }
}

impl<T: 'static, K: KeySource> State<T, K> {
    pub fn with_options(initial: Option<T>, options: StateOptions<K>) -> Self {
        Self {
            inner: Rc::new(StateInner {
                values: RefCell::new(Values::new(initial.map(Rc::new))),
                registry: RefCell::new(Registry::new(options.key_source)),
                label: options.label,
                on_failure: options.on_failure,
            }),
        }
    }

    /// Register a listener and call it once, right away, with the current
    /// `(value, previous_value)`.
    ///
    /// A panic in that first call is reported like any listener failure; the
    /// listener stays attached.
    pub fn attach(&self, listener: impl Fn(Option<&T>, Option<&T>) + 'static) -> Attachment {
        let listener: Listener<T> = Rc::new(listener);
        let key = self.inner.registry.borrow_mut().insert(listener.clone());
        tracing::trace!(state = self.inner.label(), %key, "attach");

        let (current, previous) = self.inner.values.borrow().pair();
        invoke_isolated(key, self.inner.sink(), || {
            listener(current.as_deref(), previous.as_deref())
        });

        let owner: Weak<dyn ListenerOwner> = Rc::downgrade(&self.inner) as Weak<dyn ListenerOwner>;
        Attachment::new(key, owner)
    }

    /// Store `value` and notify every listener.
    ///
    /// The previous value becomes the old current value. This always runs a
    /// full pass, even when `value` equals the current value.
    pub fn update(&self, value: T) -> NotifyReport {
        self.commit_and_notify(value).1
    }

    /// Like [`update`](State::update), then call `on_complete` with the new
    /// value once every listener of the pass has run.
    ///
    /// A panic in `on_complete` is caught and logged like a listener failure
    /// and shows up as [`NotifyReport::completion_failure`].
    pub fn update_with(&self, value: T, on_complete: impl FnOnce(&T)) -> NotifyReport {
        let (value, mut report) = self.commit_and_notify(value);
        if let Some(message) = complete_isolated(self.inner.sink(), || on_complete(&value)) {
            report.set_completion_failure(message);
        }
        report
    }

    fn commit_and_notify(&self, value: T) -> (Rc<T>, NotifyReport) {
        let next = Rc::new(value);
        let (current, previous) = {
            let mut values = self.inner.values.borrow_mut();
            values.push(next.clone());
            values.pair()
        };

        let listeners = self.inner.registry.borrow().snapshot();
        tracing::trace!(
            state = self.inner.label(),
            listeners = listeners.len(),
            "update"
        );

        let report = run_pass(&listeners, self.inner.sink(), |listener| {
            listener(current.as_deref(), previous.as_deref())
        });
        (next, report)
    }

    /// The current value (cloning).
    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.values.borrow().current.as_deref().cloned()
    }

    /// The value held before the most recent update (cloning).
    pub fn previous_value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.values.borrow().previous.as_deref().cloned()
    }

    /// Access the current value without cloning it.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let current = self.inner.values.borrow().current.clone();
        f(current.as_deref())
    }

    /// Access the previous value without cloning it.
    pub fn with_previous<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let previous = self.inner.values.borrow().previous.clone();
        f(previous.as_deref())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    pub fn has_listeners(&self) -> bool {
        !self.inner.registry.borrow().is_empty()
    }

    /// Detach every listener. Outstanding attachments become inert.
    pub fn clear_listeners(&self) -> usize {
        let cleared = self.inner.registry.borrow_mut().clear();
        tracing::trace!(state = self.inner.label(), cleared, "clear listeners");
        cleared
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }
}

impl<T, K> Clone for State<T, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static, K: KeySource> fmt::Debug for State<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.inner.values.borrow();
        f.debug_struct("State")
            .field("label", &self.inner.label)
            .field("value", &values.current.as_deref())
            .field("previous", &values.previous.as_deref())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// =============================================================================
// STATE CREATION FUNCTIONS
// =============================================================================

/// Create a new observable state.
///
/// # Example
///
/// ```
/// use spark_state::state;
///
/// let count = state(0);
/// count.update(42);
/// assert_eq!(count.value(), Some(42));
/// assert_eq!(count.previous_value(), Some(0));
/// ```
pub fn state<T: 'static>(value: T) -> State<T> {
    State::new(value)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::RandomKeys;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Calls = Rc<RefCell<Vec<(Option<i32>, Option<i32>)>>>;

    fn recorder(s: &State<i32>) -> (Calls, Attachment) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let calls_clone = calls.clone();
        let handle = s.attach(move |cur, prev| {
            calls_clone.borrow_mut().push((cur.copied(), prev.copied()));
        });
        (calls, handle)
    }

    #[test]
    fn new_state_has_equal_current_and_previous() {
        let s = state(3);
        assert_eq!(s.value(), Some(3));
        assert_eq!(s.previous_value(), Some(3));
    }

    #[test]
    fn empty_state_has_no_values() {
        let s: State<String> = State::empty();
        assert_eq!(s.value(), None);
        assert_eq!(s.previous_value(), None);

        s.update("first".into());
        assert_eq!(s.value().as_deref(), Some("first"));
        assert_eq!(s.previous_value(), None);
    }

    #[test]
    fn attach_fires_immediately() {
        let s = state(0);
        let (calls, _handle) = recorder(&s);
        assert_eq!(*calls.borrow(), vec![(Some(0), Some(0))]);
    }

    #[test]
    fn attach_on_empty_state_fires_with_none() {
        let s: State<i32> = State::empty();
        let (calls, _handle) = recorder(&s);
        assert_eq!(*calls.borrow(), vec![(None, None)]);
    }

    #[test]
    fn update_shifts_values_and_notifies() {
        let s = state(0);
        let (calls, _handle) = recorder(&s);

        let report = s.update(5);
        assert_eq!(report.notified(), 1);
        assert!(report.is_clean());
        assert_eq!(s.value(), Some(5));
        assert_eq!(s.previous_value(), Some(0));
        assert_eq!(calls.borrow().last(), Some(&(Some(5), Some(0))));
    }

    #[test]
    fn concrete_scenario() {
        let s = state(0);
        let (calls, handle) = recorder(&s);
        s.update(5);
        handle.detach();
        s.update(9);

        assert_eq!(*calls.borrow(), vec![(Some(0), Some(0)), (Some(5), Some(0))]);
        assert_eq!(s.value(), Some(9));
        assert_eq!(s.previous_value(), Some(5));
    }

    #[test]
    fn equal_value_still_notifies() {
        let s = state(1);
        let (calls, _handle) = recorder(&s);

        s.update(1);
        s.update(1);
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn all_listeners_see_same_pair() {
        let s = state(10);
        let handles: Vec<(Calls, Attachment)> = (0..4).map(|_| recorder(&s)).collect();

        s.update(20);
        for (calls, _) in &handles {
            assert_eq!(calls.borrow().len(), 2);
            assert_eq!(calls.borrow()[1], (Some(20), Some(10)));
        }
    }

    #[test]
    fn listeners_run_in_attach_order() {
        let s = state(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut handles = Vec::new();
        for n in 0..5 {
            let order = order.clone();
            handles.push(s.attach(move |_, _| order.borrow_mut().push(n)));
        }
        order.borrow_mut().clear();

        s.update(1);
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn detach_leaves_other_listeners() {
        let s = state(0);
        let (a_calls, a) = recorder(&s);
        let (b_calls, _b) = recorder(&s);

        assert!(a.detach());
        s.update(1);

        assert_eq!(a_calls.borrow().len(), 1);
        assert_eq!(b_calls.borrow().len(), 2);
        assert_eq!(s.listener_count(), 1);
    }

    #[test]
    fn detach_twice_is_noop() {
        let s = state(0);
        let (_calls, handle) = recorder(&s);
        let (other_calls, _other) = recorder(&s);

        assert!(handle.detach());
        assert!(!handle.detach());
        assert!(!handle.is_attached());

        s.update(1);
        assert_eq!(other_calls.borrow().len(), 2);
    }

    #[test]
    fn detach_after_state_dropped() {
        let s = state(0);
        let (_calls, handle) = recorder(&s);
        drop(s);

        assert!(!handle.is_attached());
        assert!(!handle.detach());
    }

    #[test]
    fn keys_unique_across_attach_detach_cycles() {
        let s = state(0);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let handle = s.attach(|_, _| {});
            assert!(seen.insert(handle.key()));
            handle.detach();
        }
        let last = s.attach(|_, _| {});
        assert!(seen.insert(last.key()));
        assert_eq!(s.listener_count(), 1);
    }

    #[test]
    fn random_keys_state() {
        let s = State::with_options(Some(0), StateOptions::new().key_source(RandomKeys::new()));
        let a = s.attach(|_, _| {});
        let b = s.attach(|_, _| {});
        assert_ne!(a.key(), b.key());
        assert_eq!(s.update(1).notified(), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_pass() {
        let s = state(0);
        let (before, _a) = recorder(&s);
        let _bad = s.attach(|cur, _| {
            if cur == Some(&1) {
                panic!("cannot handle one");
            }
        });
        let (after, _c) = recorder(&s);

        let report = s.update(1);

        assert_eq!(report.notified(), 3);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].message, "cannot handle one");
        assert_eq!(before.borrow().len(), 2);
        assert_eq!(after.borrow().len(), 2);
        assert_eq!(s.value(), Some(1));
        assert_eq!(s.previous_value(), Some(0));
    }

    #[test]
    fn panicking_attach_call_keeps_listener() {
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = failures.clone();
        let s = State::with_options(
            Some(0),
            StateOptions::new().on_failure(move |_| {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let handle = s.attach(|_, _| panic!("always"));
        assert!(handle.is_attached());
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        let report = s.update(1);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn update_with_completes_after_listeners() {
        let s = state(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        let order_clone = order.clone();
        let _handle = s.attach(move |cur, _| order_clone.borrow_mut().push(format!("listener {cur:?}")));

        s.update_with(7, |value| order.borrow_mut().push(format!("done {value}")));

        assert_eq!(
            *order.borrow(),
            vec!["listener Some(0)", "listener Some(7)", "done 7"]
        );
    }

    #[test]
    fn panicking_completion_is_reported() {
        let s = state(0);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let _handle = s.attach(move |_, _| calls_clone.set(calls_clone.get() + 1));

        let report = s.update_with(1, |_| panic!("completion failed"));
        assert_eq!(report.completion_failure(), Some("completion failed"));
        assert!(report.is_clean());
        assert_eq!(calls.get(), 2);

        // Container is still usable
        let report = s.update(2);
        assert_eq!(report.completion_failure(), None);
        assert_eq!(calls.get(), 3);
        assert_eq!(s.value(), Some(2));
    }

    #[test]
    fn listener_can_detach_itself() {
        let s = state(0);
        let calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Attachment>>> = Rc::new(RefCell::new(None));

        let calls_clone = calls.clone();
        let slot_clone = slot.clone();
        let handle = s.attach(move |cur, _| {
            calls_clone.set(calls_clone.get() + 1);
            if cur == Some(&1) {
                if let Some(me) = slot_clone.borrow().as_ref() {
                    me.detach();
                }
            }
        });
        *slot.borrow_mut() = Some(handle);

        s.update(1);
        s.update(2);
        assert_eq!(calls.get(), 2);
        assert_eq!(s.listener_count(), 0);
    }

    #[test]
    fn listener_attached_during_pass_waits_for_next_update() {
        let s = state(0);
        let late_calls = Rc::new(RefCell::new(Vec::new()));
        let late_handles = Rc::new(RefCell::new(Vec::new()));

        let s_clone = s.clone();
        let late_calls_clone = late_calls.clone();
        let late_handles_clone = late_handles.clone();
        let _spawner = s.attach(move |cur, _| {
            if cur == Some(&1) {
                let late_calls = late_calls_clone.clone();
                let handle = s_clone.attach(move |cur, _| late_calls.borrow_mut().push(cur.copied()));
                late_handles_clone.borrow_mut().push(handle);
            }
        });

        let report = s.update(1);
        // Only the spawner was captured; the late listener got its attach call
        assert_eq!(report.notified(), 1);
        assert_eq!(*late_calls.borrow(), vec![Some(1)]);

        s.update(2);
        assert_eq!(*late_calls.borrow(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn nested_update_runs_its_own_pass() {
        let s = state(0);
        let (calls, _recorder) = recorder(&s);

        let s_clone = s.clone();
        let _bumper = s.attach(move |cur, _| {
            if cur == Some(&1) {
                s_clone.update(2);
            }
        });
        let (tail_calls, _tail) = recorder(&s);

        s.update(1);

        assert_eq!(s.value(), Some(2));
        assert_eq!(s.previous_value(), Some(1));
        // The outer pass keeps its own pair for listeners after the bumper
        assert_eq!(
            *tail_calls.borrow(),
            vec![(Some(0), Some(0)), (Some(2), Some(1)), (Some(1), Some(0))]
        );
        assert_eq!(
            *calls.borrow(),
            vec![(Some(0), Some(0)), (Some(1), Some(0)), (Some(2), Some(1))]
        );
    }

    #[test]
    fn with_value_borrows_without_clone() {
        struct NoClone(u8);
        let s = state(NoClone(4));
        assert_eq!(s.with_value(|v| v.map(|n| n.0)), Some(4));

        s.update(NoClone(8));
        assert_eq!(s.with_previous(|v| v.map(|n| n.0)), Some(4));
    }

    #[test]
    fn clear_listeners_makes_handles_inert() {
        let s = state(0);
        let (_a_calls, a) = recorder(&s);
        let (_b_calls, _b) = recorder(&s);

        assert_eq!(s.clear_listeners(), 2);
        assert!(!s.has_listeners());
        assert!(!a.is_attached());
        assert!(!a.detach());
    }

    #[test]
    fn clone_shares_state() {
        let a = state(1);
        let b = a.clone();
        b.update(2);
        assert_eq!(a.value(), Some(2));
    }

    #[test]
    fn state_debug() {
        let s = State::with_options(Some(42), StateOptions::new().label("answer"));
        let debug_str = format!("{:?}", s);
        assert!(debug_str.contains("State"));
        assert!(debug_str.contains("answer"));
        assert!(debug_str.contains("42"));
    }
}
