//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`.
//! Each adapter handles communication with external systems.

pub mod allocator;
pub mod process;
pub mod readiness;

// Re-export main types for convenience
pub use allocator::EphemeralPortAllocator;
pub use process::TokioProcessLauncher;
pub use readiness::PatternReadinessDetector;
