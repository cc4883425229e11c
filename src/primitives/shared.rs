// ============================================================================
// spark-state - Shared State
//
// Thread-safe observable value. update() commits the new value immediately
// and hands back a Batch: the notification of the listeners captured at that
// moment, run when the batch is awaited or dropped.
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::core::key::{KeySource, ListenerKey, SequentialKeys};
use crate::core::registry::Registry;
use crate::core::types::{FailureHook, NotifyReport, SharedListener, Values};
use crate::primitives::attachment::{ListenerOwner, SharedAttachment};
use crate::primitives::state::StateOptions;
use crate::reactivity::batch::Batch;
use crate::reactivity::notify::{FailureSink, complete_isolated, invoke_isolated, run_pass};

type CompletionFn<T> = Box<dyn FnOnce(&T) + Send>;

// =============================================================================
// SHARED INNER
// =============================================================================

// Lock order: registry, then values.
struct SharedInner<T, K> {
    registry: Mutex<Registry<SharedListener<T>, K>>,
    values: RwLock<Values<Arc<T>>>,
    label: Option<Arc<str>>,
    on_failure: Option<FailureHook>,
}

impl<T, K> SharedInner<T, K> {
    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unlabeled>")
    }
}

impl<T, K: KeySource> ListenerOwner for SharedInner<T, K> {
    fn detach_key(&self, key: ListenerKey) -> bool {
        let removed = self.registry.lock().remove(key);
        tracing::trace!(state = self.label(), %key, removed, "detach");
        removed
    }

    fn has_key(&self, key: ListenerKey) -> bool {
        self.registry.lock().contains(key)
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

/// A thread-safe observable value with deferred notification.
///
/// [`update`](SharedState::update) stores the value right away and returns a
/// [`Batch`]. The batch holds the listeners registered at that instant and
/// the `(current, previous)` pair; awaiting it calls each listener in attach
/// order and resolves to a [`NotifyReport`]. A batch that is never awaited
/// runs when it is dropped. Attaching or detaching after `update` returned
/// does not change an in-flight batch.
///
/// [`attach`](SharedState::attach) still calls the new listener once,
/// synchronously, before returning.
///
/// # Example
///
/// ```
/// use spark_state::shared_state;
/// use std::sync::{Arc, Mutex};
///
/// let config = shared_state(String::from("v1"));
/// let log = Arc::new(Mutex::new(Vec::new()));
///
/// let log_clone = log.clone();
/// let _handle = config.attach(move |current, previous| {
///     log_clone.lock().unwrap().push(format!("{previous:?} -> {current:?}"));
/// });
///
/// let report = config.update_blocking(String::from("v2"));
/// assert!(report.is_clean());
/// assert_eq!(log.lock().unwrap().len(), 2);
/// ```
pub struct SharedState<T, K = SequentialKeys> {
    inner: Arc<SharedInner<T, K>>,
}

impl<T: Send + Sync + 'static> SharedState<T> {
    pub fn new(value: T) -> Self {
        Self::from_option(Some(value))
    }

    pub fn empty() -> Self {
        Self::from_option(None)
    }

    pub fn from_option(initial: Option<T>) -> Self {
        Self::with_options(initial, StateOptions::new())
    }
}

impl<T: Send + Sync + 'static, K: KeySource> SharedState<T, K> {
    pub fn with_options(initial: Option<T>, options: StateOptions<K>) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                registry: Mutex::new(Registry::new(options.key_source)),
                values: RwLock::new(Values::new(initial.map(Arc::new))),
                label: options.label.map(Arc::from),
                on_failure: options.on_failure,
            }),
        }
    }

    fn sink(&self) -> FailureSink<'_> {
        FailureSink {
            label: self.inner.label.as_deref(),
            hook: self.inner.on_failure.as_ref(),
        }
    }

    /// Register a listener and call it once with the current pair.
    ///
    /// The pair is read while the registry is locked, so any update either
    /// happened before the attach (and is reflected in this first call) or
    /// captures the new listener in its batch.
    ///
    /// The first call itself runs after the lock is released. A batch driven
    /// on another thread in the meantime can therefore reach the listener
    /// with a newer pair before this call delivers the older one. Listeners
    /// that need ordering should compare against
    /// [`value`](SharedState::value) rather than rely on arrival order.
    pub fn attach(
        &self,
        listener: impl Fn(Option<&T>, Option<&T>) + Send + Sync + 'static,
    ) -> SharedAttachment {
        let listener: SharedListener<T> = Arc::new(listener);
        let (key, current, previous) = {
            let mut registry = self.inner.registry.lock();
            let key = registry.insert(listener.clone());
            let (current, previous) = self.inner.values.read().pair();
            (key, current, previous)
        };
        tracing::trace!(state = self.inner.label(), %key, "attach");

        invoke_isolated(key, self.sink(), || {
            listener(current.as_deref(), previous.as_deref())
        });

        let owner: Weak<dyn ListenerOwner + Send + Sync> =
            Arc::downgrade(&self.inner) as Weak<dyn ListenerOwner + Send + Sync>;
        SharedAttachment::new(key, owner)
    }

    /// Store `value` and schedule notification of every current listener.
    ///
    /// The value is committed before this returns; always schedules a full
    /// batch, even when `value` equals the current value.
    pub fn update(&self, value: T) -> Batch {
        self.schedule(value, None)
    }

    /// Like [`update`](SharedState::update); `on_complete` receives the new
    /// value after every listener in the batch has finished, failed ones
    /// included. A panic in `on_complete` is caught and logged, and shows up
    /// as [`NotifyReport::completion_failure`].
    pub fn update_with(&self, value: T, on_complete: impl FnOnce(&T) + Send + 'static) -> Batch {
        self.schedule(value, Some(Box::new(on_complete)))
    }

    /// Update and drive the batch to completion on this thread.
    pub fn update_blocking(&self, value: T) -> NotifyReport {
        self.update(value).wait()
    }

    fn schedule(&self, value: T, on_complete: Option<CompletionFn<T>>) -> Batch {
        let next = Arc::new(value);
        let (listeners, current, previous) = {
            let registry = self.inner.registry.lock();
            let mut values = self.inner.values.write();
            values.push(next.clone());
            let (current, previous) = values.pair();
            (registry.snapshot(), current, previous)
        };
        tracing::trace!(
            state = self.inner.label(),
            listeners = listeners.len(),
            "update scheduled"
        );

        let label = self.inner.label.clone();
        let hook = self.inner.on_failure.clone();
        Batch::new(async move {
            let sink = FailureSink {
                label: label.as_deref(),
                hook: hook.as_ref(),
            };
            let mut report = run_pass(&listeners, sink, |listener| {
                listener(current.as_deref(), previous.as_deref())
            });
            if let Some(done) = on_complete {
                if let Some(message) = complete_isolated(sink, || done(&next)) {
                    report.set_completion_failure(message);
                }
            }
            report
        })
    }

    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.values.read().current.as_deref().cloned()
    }

    pub fn previous_value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.values.read().previous.as_deref().cloned()
    }

    /// Access the current value without cloning it. No lock is held while
    /// `f` runs.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let current = self.inner.values.read().current.clone();
        f(current.as_deref())
    }

    pub fn with_previous<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let previous = self.inner.values.read().previous.clone();
        f(previous.as_deref())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    pub fn has_listeners(&self) -> bool {
        !self.inner.registry.lock().is_empty()
    }

    /// Detach every listener. Outstanding attachments become inert;
    /// batches already scheduled still run.
    pub fn clear_listeners(&self) -> usize {
        let cleared = self.inner.registry.lock().clear();
        tracing::trace!(state = self.inner.label(), cleared, "clear listeners");
        cleared
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }
}

impl<T, K> Clone for SharedState<T, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug + Send + Sync + 'static, K: KeySource> fmt::Debug for SharedState<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listener_count();
        let values = self.inner.values.read();
        f.debug_struct("SharedState")
            .field("label", &self.inner.label)
            .field("value", &values.current.as_deref())
            .field("previous", &values.previous.as_deref())
            .field("listeners", &listeners)
            .finish()
    }
}

/// Create a new thread-safe observable state.
pub fn shared_state<T: Send + Sync + 'static>(value: T) -> SharedState<T> {
    SharedState::new(value)
}

// =============================================================================
// TESTS
// =============================================================================
