//! Service Module
//!
//! Business logic layer of the store.
//! Services orchestrate between repositories and contain domain logic.

pub mod pipeline;

// Re-export for convenience
pub use pipeline as pipeline_service;
