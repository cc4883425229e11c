// ============================================================================
// spark-state - Errors
// ============================================================================

use thiserror::Error;

use super::types::ListenerFailure;

/// Errors surfaced by a notification pass.
///
/// Detaching an unknown or already removed listener is not an error, so this
/// only covers listeners that panicked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("{} of {notified} listeners panicked during notification", .failures.len())]
    ListenersPanicked {
        failures: Vec<ListenerFailure>,
        notified: usize,
    },
}

impl NotifyError {
    pub fn failures(&self) -> &[ListenerFailure] {
        match self {
            Self::ListenersPanicked { failures, .. } => failures,
        }
    }
}
