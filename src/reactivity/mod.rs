// ============================================================================
// spark-state - Reactivity Module
// Notification passes and deferred batches
// ============================================================================

pub mod batch;
pub(crate) mod notify;

pub use batch::Batch;
