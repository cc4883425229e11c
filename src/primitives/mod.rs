// ============================================================================
// spark-state - Primitives Module
// Observable containers and their attachment handles
// ============================================================================

pub mod attachment;
pub mod shared;
pub mod state;

// Re-export for convenience
pub use attachment::{Attachment, Detach, DetachGuard, SharedAttachment};
pub use shared::{SharedState, shared_state};
pub use state::{State, StateOptions, state};
