// ============================================================================
// spark-state - Listener Registry
// Insertion-ordered key -> listener storage owned by a container
// ============================================================================

use super::key::{KeySource, ListenerKey, SequentialKeys};

/// The listeners of one container, in attach order.
///
/// `L` is the stored listener handle (`Rc<dyn Fn>` for [`State`],
/// `Arc<dyn Fn + Send + Sync>` for [`SharedState`]). The registry never calls
/// listeners itself; containers take a [`snapshot`](Registry::snapshot) and
/// invoke it with no borrow or lock held.
///
/// [`State`]: crate::State
/// [`SharedState`]: crate::SharedState
pub struct Registry<L, K = SequentialKeys> {
    entries: Vec<(ListenerKey, L)>,
    keys: K,
}

impl<L, K: KeySource> Registry<L, K> {
    pub fn new(keys: K) -> Self {
        Self {
            entries: Vec::new(),
            keys,
        }
    }

    /// Register a listener under a fresh key.
    pub fn insert(&mut self, listener: L) -> ListenerKey {
        let entries = &self.entries;
        let key = self
            .keys
            .next_key(&|candidate: ListenerKey| entries.iter().any(|(k, _)| *k == candidate));
        self.entries.push((key, listener));
        key
    }

    /// Remove the listener registered under `key`.
    ///
    /// Returns false when nothing was registered under it.
    pub fn remove(&mut self, key: ListenerKey) -> bool {
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: ListenerKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every listener, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Copy of the current entries, in attach order.
    pub fn snapshot(&self) -> Vec<(ListenerKey, L)>
    where
        L: Clone,
    {
        self.entries.clone()
    }
}

impl<L> Default for Registry<L, SequentialKeys> {
    fn default() -> Self {
        Self::new(SequentialKeys::new())
    }
}

// =============================================================================
// TESTS
// =============================================================================
