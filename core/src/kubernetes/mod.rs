//! Kubernetes module for port forwarding and forwardable-port discovery.
//!
//! This module provides:
//! - Resource discovery via kubectl
//! - Derivation of forwardable ports from services and workloads
//! - Supervision of kubectl port-forward processes
//! - A per-key tunnel registry and process-wide shutdown

pub mod command;
pub mod connection_manager;
pub mod discovery;
pub mod errors;
pub mod forwardable;
pub mod models;
pub mod process_manager;
pub mod registry;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use command::PortForwardCommand;
pub use connection_manager::PortForwardManager;
pub use discovery::{find_kubectl, KubernetesDiscovery};
pub use errors::KubectlError;
pub use forwardable::compute_forwardable_ports;
pub use models::KubernetesResource;
pub use process_manager::{Tunnel, TunnelProcessSupervisor};
pub use registry::TunnelRegistry;
pub use shutdown::ShutdownCoordinator;
