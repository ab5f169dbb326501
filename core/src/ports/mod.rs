//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the tunnel manager uses
//! to interact with external systems. Implementations live in `adapters`.

mod allocator;
mod process;
mod readiness;

pub use allocator::PortAllocator;
pub use process::{ProcessControl, ProcessExit, ProcessHandle, ProcessLauncher};
pub use readiness::{LineClass, ReadinessDetector};
