// ============================================================================
// spark-state - Core Module
// Keys, registry, shared types and errors
// ============================================================================

pub mod error;
pub mod key;
pub mod registry;
pub mod types;
