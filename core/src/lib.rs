//! podtunnel Core Library
//!
//! Manages port forwards from the local machine into a Kubernetes cluster.
//! Provides functionality to:
//! - Derive which ports of services and workloads can be forwarded
//! - Spawn and supervise `kubectl port-forward` processes
//! - Share one live tunnel per target and port across concurrent callers
//! - Tear every tunnel down on shutdown
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models (tunnel keys, descriptors, forwardable ports)
//! - `ports`: Trait definitions (process launching, port allocation, readiness)
//! - `adapters`: Implementations backed by tokio processes and sockets
//! - `kubernetes`: kubectl discovery and tunnel lifecycle management

// Hexagonal architecture layers
pub mod adapters;
pub mod domain;
pub mod ports;

pub mod config;
pub mod error;
pub mod kubernetes;

// Re-export domain types (primary API)
pub use domain::{
    ForwardProtocol, ForwardablePort, TargetKind, TargetResource, TunnelDescriptor, TunnelKey,
    TunnelStatus,
};

// Re-export other commonly used types
pub use config::{ConfigStore, ForwardConfig};
pub use error::{Error, Result};
pub use kubernetes::{compute_forwardable_ports, PortForwardManager, Tunnel};
