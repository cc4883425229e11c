// ============================================================================
// spark-state - Attachments
//
// Handles returned by attach(). A handle holds only its listener key and a
// weak back-reference to the container; detaching asks the container to
// remove that key. Handles never touch the registry themselves.
// ============================================================================

use std::fmt;
use std::rc::Weak;
use std::sync::Weak as SyncWeak;

use crate::core::key::ListenerKey;

// =============================================================================
// TYPE-ERASED OWNER
// =============================================================================
//
// Handles don't need to know the container's value type, only how to ask it
// to drop a key. The containers implement this over their shared inner state.
// =============================================================================

pub(crate) trait ListenerOwner {
    /// Remove the listener under `key`; false if it was already gone.
    fn detach_key(&self, key: ListenerKey) -> bool;

    fn has_key(&self, key: ListenerKey) -> bool;
}

// =============================================================================
// DETACH TRAIT
// =============================================================================

/// Capability to remove exactly one listener.
pub trait Detach {
    /// The key of the listener this handle was issued for.
    fn key(&self) -> ListenerKey;

    /// Remove the listener.
    ///
    /// Returns true if this call removed it. Detaching twice, or after the
    /// container was dropped or cleared, is a no-op returning false.
    fn detach(&self) -> bool;

    /// Whether the listener is still registered.
    fn is_attached(&self) -> bool;

    /// Wrap the handle so the listener is detached when the guard drops.
    fn into_guard(self) -> DetachGuard<Self>
    where
        Self: Sized,
    {
        DetachGuard::new(self)
    }
}

// =============================================================================
// ATTACHMENT (single-threaded)
// =============================================================================

/// Handle to a listener attached to a [`State`](crate::State).
///
/// Dropping an `Attachment` does not detach; use [`Detach::detach`] or turn
/// it into a [`DetachGuard`].
#[must_use = "dropping the attachment leaves the listener attached with no way to detach it"]
pub struct Attachment {
    key: ListenerKey,
    owner: Weak<dyn ListenerOwner>,
}

impl Attachment {
    pub(crate) fn new(key: ListenerKey, owner: Weak<dyn ListenerOwner>) -> Self {
        Self { key, owner }
    }

    /// The key of the listener this handle was issued for.
    pub fn key(&self) -> ListenerKey {
        self.key
    }

    /// Remove the listener. See [`Detach::detach`].
    pub fn detach(&self) -> bool {
        match self.owner.upgrade() {
            Some(owner) => owner.detach_key(self.key),
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|owner| owner.has_key(self.key))
    }

    pub fn into_guard(self) -> DetachGuard<Self> {
        DetachGuard::new(self)
    }
}

impl Detach for Attachment {
    fn key(&self) -> ListenerKey {
        Attachment::key(self)
    }

    fn detach(&self) -> bool {
        Attachment::detach(self)
    }

    fn is_attached(&self) -> bool {
        Attachment::is_attached(self)
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("key", &self.key)
            .field("attached", &self.is_attached())
            .finish()
    }
}

// =============================================================================
// SHARED ATTACHMENT (thread-safe)
// =============================================================================

/// Handle to a listener attached to a [`SharedState`](crate::SharedState).
///
/// `Send + Sync`: a listener can be detached from any thread.
#[must_use = "dropping the attachment leaves the listener attached with no way to detach it"]
pub struct SharedAttachment {
    key: ListenerKey,
    owner: SyncWeak<dyn ListenerOwner + Send + Sync>,
}

impl SharedAttachment {
    pub(crate) fn new(key: ListenerKey, owner: SyncWeak<dyn ListenerOwner + Send + Sync>) -> Self {
        Self { key, owner }
    }

    /// The key of the listener this handle was issued for.
    pub fn key(&self) -> ListenerKey {
        self.key
    }

    /// Remove the listener. See [`Detach::detach`].
    pub fn detach(&self) -> bool {
        match self.owner.upgrade() {
            Some(owner) => owner.detach_key(self.key),
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|owner| owner.has_key(self.key))
    }

    pub fn into_guard(self) -> DetachGuard<Self> {
        DetachGuard::new(self)
    }
}

impl Detach for SharedAttachment {
    fn key(&self) -> ListenerKey {
        SharedAttachment::key(self)
    }

    fn detach(&self) -> bool {
        SharedAttachment::detach(self)
    }

    fn is_attached(&self) -> bool {
        SharedAttachment::is_attached(self)
    }
}

impl fmt::Debug for SharedAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedAttachment")
            .field("key", &self.key)
            .field("attached", &self.is_attached())
            .finish()
    }
}

// =============================================================================
// DETACH GUARD
// =============================================================================

/// Detaches its listener when dropped.
///
/// # Example
///
/// ```
/// use spark_state::state;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let s = state(0);
/// let calls = Rc::new(Cell::new(0));
///
/// {
///     let calls = calls.clone();
///     let _guard = s.attach(move |_, _| calls.set(calls.get() + 1)).into_guard();
///     s.update(1);
/// }
///
/// s.update(2);
/// assert_eq!(calls.get(), 2); // attach + first update only
/// ```
#[must_use = "the listener is detached as soon as the guard is dropped"]
pub struct DetachGuard<H: Detach> {
    handle: Option<H>,
}

impl<H: Detach> DetachGuard<H> {
    pub fn new(handle: H) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Give the handle back without detaching.
    pub fn release(mut self) -> H {
        // Invariant: only Drop and release take the handle
        self.handle.take().expect("guard handle already released")
    }

    pub fn key(&self) -> Option<ListenerKey> {
        self.handle.as_ref().map(Detach::key)
    }
}

impl<H: Detach> Drop for DetachGuard<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.detach();
        }
    }
}

impl<H: Detach + fmt::Debug> fmt::Debug for DetachGuard<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetachGuard")
            .field("handle", &self.handle)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
