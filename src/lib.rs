// ============================================================================
// spark-state - An Observable Value Container for Rust
// ============================================================================
//
// A state container holds one value and the value before it, and notifies
// attached listeners with (current, previous) on every update.
//
// - State<T>:       single-threaded, listeners run inline during update()
// - SharedState<T>: thread-safe, update() returns a Batch future
// ============================================================================

pub mod core;
pub mod primitives;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use crate::core::error::NotifyError;
pub use crate::core::key::{KeySource, ListenerKey, RandomKeys, SequentialKeys};
pub use crate::core::types::{FailureHook, Listener, ListenerFailure, NotifyReport, SharedListener};

// Re-export primitives at crate root
pub use crate::primitives::attachment::{Attachment, Detach, DetachGuard, SharedAttachment};
pub use crate::primitives::shared::{SharedState, shared_state};
pub use crate::primitives::state::{State, StateOptions, state};

pub use crate::reactivity::batch::Batch;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn root_exports_cover_the_lifecycle() {
        let s = state(0);
        let calls = Rc::new(RefCell::new(Vec::new()));

        let calls_clone = calls.clone();
        let handle: Attachment = s.attach(move |cur, prev| {
            calls_clone.borrow_mut().push((cur.copied(), prev.copied()));
        });
        let report: NotifyReport = s.update(5);
        assert_eq!(report.into_result().unwrap(), 1);

        assert!(Detach::detach(&handle));
        s.update(9);

        assert_eq!(*calls.borrow(), vec![(Some(0), Some(0)), (Some(5), Some(0))]);
    }

    #[test]
    fn handles_are_interchangeable_through_detach() {
        let local = state(1);
        let shared = shared_state(1);

        let handles: Vec<Box<dyn Detach>> = vec![
            Box::new(local.attach(|_, _| {})),
            Box::new(shared.attach(|_, _| {})),
        ];

        for handle in &handles {
            assert!(handle.is_attached());
            assert!(handle.detach());
            assert!(!handle.detach());
        }
        assert!(!local.has_listeners());
        assert!(!shared.has_listeners());
    }

    #[test]
    fn failures_surface_as_errors() {
        let s = state("ok");
        let _handle = s.attach(|cur, _| {
            if cur == Some(&"bad") {
                panic!("rejected");
            }
        });

        let err = s.update("bad").into_result().unwrap_err();
        assert_eq!(err.failures()[0].message, "rejected");
        assert_eq!(s.value(), Some("bad"));
    }
}
