// ============================================================================
// spark-state - Listener Keys
// Per-container identities for attached listeners
// ============================================================================

use std::fmt;

// =============================================================================
// LISTENER KEY
// =============================================================================

/// Opaque identity of one listener registration.
///
/// Keys are issued by a container's [`KeySource`] and are never reused while
/// the listener they name is still registered. The raw value can be read but
/// not changed, so a handle can only ever name the listener it was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerKey(u128);

impl ListenerKey {
    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// The raw key value.
    pub const fn get(self) -> u128 {
        self.0
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// KEY SOURCE
// =============================================================================

/// Strategy for generating listener keys.
///
/// `is_live` reports whether a candidate key currently names a registered
/// listener. Implementations must never return a key for which it is true.
pub trait KeySource: Send + 'static {
    fn next_key(&mut self, is_live: &dyn Fn(ListenerKey) -> bool) -> ListenerKey;
}

/// Container-scoped monotonic counter. The default strategy.
///
/// Deterministic: the first key issued by a fresh container is `#0`, the
/// next `#1`, and so on, whether or not earlier listeners were detached.
#[derive(Debug, Clone, Default)]
pub struct SequentialKeys {
    next: u128,
}

impl SequentialKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `first` instead of zero.
    pub fn starting_at(first: u128) -> Self {
        Self { next: first }
    }
}

impl KeySource for SequentialKeys {
    fn next_key(&mut self, is_live: &dyn Fn(ListenerKey) -> bool) -> ListenerKey {
        loop {
            let candidate = ListenerKey(self.next);
            self.next = self.next.wrapping_add(1);
            if !is_live(candidate) {
                return candidate;
            }
        }
    }
}

/// Random keys drawn from UUID v4 values.
///
/// A candidate that names a live listener is discarded and a new one drawn,
/// so a registration is never overwritten. Keys of detached listeners are
/// not remembered. A stale handle could only name a newer listener if v4
/// generation repeated a value (122 random bits), and in exchange the source
/// holds no state that grows with listener churn. Use [`SequentialKeys`]
/// when lifetime uniqueness must be exact.
pub struct RandomKeys {
    generate: Box<dyn FnMut() -> u128 + Send>,
}

impl RandomKeys {
    pub fn new() -> Self {
        Self {
            generate: Box::new(|| uuid::Uuid::new_v4().as_u128()),
        }
    }

    /// Use a custom source of raw candidates.
    pub fn with_generator(generate: impl FnMut() -> u128 + Send + 'static) -> Self {
        Self {
            generate: Box::new(generate),
        }
    }
}

impl Default for RandomKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RandomKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomKeys").finish_non_exhaustive()
    }
}

impl KeySource for RandomKeys {
    fn next_key(&mut self, is_live: &dyn Fn(ListenerKey) -> bool) -> ListenerKey {
        loop {
            let candidate = ListenerKey((self.generate)());
            if !is_live(candidate) {
                return candidate;
            }
            tracing::trace!(key = %candidate, "random listener key collided, regenerating");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
