//! High-level port-forward management.
//!
//! [`PortForwardManager`] is the entry point for hosts: it owns the tunnel
//! registry, the shutdown coordinator, the configuration and kubectl discovery.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::command::PortForwardCommand;
use super::discovery::KubernetesDiscovery;
use super::forwardable::compute_forwardable_ports;
use super::models::KubernetesResource;
use super::process_manager::{Tunnel, TunnelProcessSupervisor};
use super::registry::TunnelRegistry;
use super::shutdown::ShutdownCoordinator;
use crate::adapters::{EphemeralPortAllocator, TokioProcessLauncher};
use crate::config::ForwardConfig;
use crate::domain::{ForwardablePort, TunnelDescriptor, TunnelKey};
use crate::error::Result;
use crate::ports::{PortAllocator, ProcessLauncher, ReadinessDetector};

/// Manages port forwards into one namespace of a cluster.
pub struct PortForwardManager {
    config: ForwardConfig,
    discovery: KubernetesDiscovery,
    registry: Arc<TunnelRegistry>,
    shutdown: ShutdownCoordinator,
}

impl PortForwardManager {
    /// Creates a manager forwarding through kubectl child processes.
    pub fn new(config: ForwardConfig) -> Result<Self> {
        let detector = config.readiness_detector()?;
        let allocator = EphemeralPortAllocator::new(config.listen_address()?);
        let discovery = KubernetesDiscovery::from_config(&config);
        Self::with_components(
            config,
            discovery,
            Arc::new(TokioProcessLauncher::new()),
            Arc::new(allocator),
            Arc::new(detector),
        )
    }

    /// Creates a manager from explicit collaborators.
    pub fn with_components(
        config: ForwardConfig,
        discovery: KubernetesDiscovery,
        launcher: Arc<dyn ProcessLauncher>,
        allocator: Arc<dyn PortAllocator>,
        detector: Arc<dyn ReadinessDetector>,
    ) -> Result<Self> {
        config.validate()?;

        // Without a located kubectl, spawning fails with a descriptive error.
        let program = discovery.kubectl_path().cloned().unwrap_or_else(|| {
            warn!("kubectl not found, relying on PATH at spawn time");
            PathBuf::from("kubectl")
        });
        let command = PortForwardCommand::from_config(program, &config);

        let supervisor = TunnelProcessSupervisor::new(launcher, detector, command)
            .with_settle_delay(config.settle_delay())
            .with_readiness_timeout(config.readiness_timeout());
        let registry = Arc::new(TunnelRegistry::new(supervisor, allocator));
        let shutdown = ShutdownCoordinator::new(registry.clone(), config.shutdown_grace());

        Ok(Self {
            config,
            discovery,
            registry,
            shutdown,
        })
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    // =========================================================================
    // Tunnels
    // =========================================================================

    /// Returns an active tunnel to `target` (`<Kind>/<name>`) on `remote_port`.
    ///
    /// Reuses the live tunnel for the same target and port if one exists.
    pub async fn acquire_forward(
        &self,
        target: &str,
        remote_port: u16,
    ) -> Result<TunnelDescriptor> {
        let key = TunnelKey::parse(target, remote_port)?;
        self.registry.acquire(&key).await
    }

    /// Like [`PortForwardManager::acquire_forward`], returning the tunnel
    /// handle so the caller can wait for it to close.
    pub async fn acquire_tunnel(&self, target: &str, remote_port: u16) -> Result<Arc<Tunnel>> {
        let key = TunnelKey::parse(target, remote_port)?;
        self.registry.acquire_tunnel(&key).await
    }

    /// Kills and forgets the tunnel to `target` on `remote_port`, if any.
    pub fn release_forward(&self, target: &str, remote_port: u16) -> Result<()> {
        let key = TunnelKey::parse(target, remote_port)?;
        if !self.registry.release(&key) {
            debug!(key = %key, "no port forward to release");
        }
        Ok(())
    }

    /// The live tunnel to `target` on `remote_port`, if any.
    pub fn tunnel(&self, target: &str, remote_port: u16) -> Result<Option<Arc<Tunnel>>> {
        let key = TunnelKey::parse(target, remote_port)?;
        Ok(self.registry.tunnel(&key))
    }

    /// Snapshots of every registered tunnel.
    pub fn forwards(&self) -> Vec<TunnelDescriptor> {
        self.registry.forwards()
    }

    /// Terminates every tunnel. Later acquires fail with `ShutDown`.
    pub async fn shutdown(&self) {
        self.shutdown.shutdown().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_shut_down()
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Derives the forwardable ports of a resource snapshot.
    pub fn compute_forwardable_ports(
        &self,
        resources: &[KubernetesResource],
    ) -> Vec<ForwardablePort> {
        compute_forwardable_ports(resources)
    }

    /// Lists the forwardable ports of `namespace`, or of the configured
    /// namespace when `None`.
    pub async fn fetch_forwardable_ports(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ForwardablePort>> {
        let namespace = namespace.unwrap_or(self.config.namespace.as_str());
        let resources = self.discovery.fetch_resources(namespace).await?;
        Ok(compute_forwardable_ports(&resources))
    }
}
