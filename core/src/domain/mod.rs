//! Domain layer - Pure business logic and data models.
//!
//! This module contains the core domain types and logic that are
//! independent of any external systems or I/O.

mod forwardable;
mod tunnel;

pub use forwardable::{selector_matches, ForwardProtocol, ForwardablePort};
pub use tunnel::{TargetKind, TargetResource, TunnelDescriptor, TunnelKey, TunnelStatus};
