//! Process-wide teardown of every registered tunnel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::registry::TunnelRegistry;

/// Terminates every tunnel of a registry, once.
pub struct ShutdownCoordinator {
    registry: Arc<TunnelRegistry>,
    grace: Duration,
    fired: AtomicBool,
}

impl ShutdownCoordinator {
    /// `grace` bounds the wait for all tunnel processes to exit.
    pub fn new(registry: Arc<TunnelRegistry>, grace: Duration) -> Self {
        Self {
            registry,
            grace,
            fired: AtomicBool::new(false),
        }
    }

    /// Kills every registered tunnel and waits for the processes to exit.
    ///
    /// Idempotent. Never fails: a tunnel that does not exit within the grace
    /// period is logged and left behind.
    pub async fn shutdown(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("shutdown already requested");
            return;
        }
        self.registry.close();

        let tunnels = self.registry.all_tunnels();
        info!(count = tunnels.len(), "shutting down port forwards");

        for tunnel in &tunnels {
            if tunnel.kill() {
                debug!(key = %tunnel.key(), pid = ?tunnel.pid(), "killed port forward");
            }
        }

        let deadline = Instant::now() + self.grace;
        for tunnel in &tunnels {
            if timeout_at(deadline, tunnel.closed()).await.is_err() {
                warn!(
                    key = %tunnel.key(),
                    pid = ?tunnel.pid(),
                    "port forward did not exit within {:?}",
                    self.grace
                );
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PatternReadinessDetector;
    use crate::domain::{TunnelKey, TunnelStatus};
    use crate::error::Error;
    use crate::kubernetes::command::PortForwardCommand;
    use crate::kubernetes::process_manager::TunnelProcessSupervisor;
    use crate::kubernetes::testing::{Behavior, FakeLauncher, SequentialPortAllocator};
    use std::path::PathBuf;

    fn coordinator(launcher: Arc<FakeLauncher>) -> (Arc<TunnelRegistry>, ShutdownCoordinator) {
        coordinator_with(launcher, Duration::from_secs(1))
    }

    fn coordinator_with(
        launcher: Arc<FakeLauncher>,
        grace: Duration,
    ) -> (Arc<TunnelRegistry>, ShutdownCoordinator) {
        let supervisor = TunnelProcessSupervisor::new(
            launcher,
            Arc::new(PatternReadinessDetector::kubectl()),
            PortForwardCommand::new(PathBuf::from("kubectl"), "default"),
        );
        let registry = Arc::new(TunnelRegistry::new(
            supervisor,
            SequentialPortAllocator::new(),
        ));
        let coordinator = ShutdownCoordinator::new(registry.clone(), grace);
        (registry, coordinator)
    }

    #[tokio::test]
    async fn test_shutdown_terminates_every_tunnel() {
        let launcher = FakeLauncher::new(Behavior::Ready);
        let (registry, coordinator) = coordinator(launcher.clone());

        let web = TunnelKey::parse("Service/web", 8080).unwrap();
        let api = TunnelKey::parse("Deployment/api", 3000).unwrap();
        registry.acquire(&web).await.unwrap();
        registry.acquire(&api).await.unwrap();
        let tunnels = registry.all_tunnels();

        coordinator.shutdown().await;

        assert!(coordinator.is_shut_down());
        assert!(launcher.process(0).control.is_killed());
        assert!(launcher.process(1).control.is_killed());
        assert!(tunnels
            .iter()
            .all(|t| t.status() == TunnelStatus::Terminated));
        assert!(registry.forwards().is_empty());

        let err = registry.acquire(&web).await.unwrap_err();
        assert!(matches!(err, Error::ShutDown));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let launcher = FakeLauncher::new(Behavior::Ready);
        let (registry, coordinator) = coordinator(launcher.clone());
        registry
            .acquire(&TunnelKey::parse("Service/web", 8080).unwrap())
            .await
            .unwrap();

        coordinator.shutdown().await;
        coordinator.shutdown().await;

        assert_eq!(launcher.launches(), 1);
        assert!(registry.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_skips_already_killed_tunnels() {
        let launcher = FakeLauncher::new(Behavior::Ready);
        let (registry, coordinator) = coordinator(launcher.clone());
        let web = TunnelKey::parse("Service/web", 8080).unwrap();
        registry.acquire(&web).await.unwrap();
        let tunnel = registry.tunnel(&web).unwrap();
        tunnel.kill();

        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(2), coordinator.shutdown()).await
        );
        assert_eq!(tunnel.status(), TunnelStatus::Terminated);
    }

    #[tokio::test]
    async fn test_grace_period_is_shared_by_all_tunnels() {
        let launcher = FakeLauncher::new(Behavior::Ready);
        let (registry, coordinator) =
            coordinator_with(launcher.clone(), Duration::from_millis(200));
        for port in [8080, 8081, 8082] {
            registry
                .acquire(&TunnelKey::parse("Service/web", port).unwrap())
                .await
                .unwrap();
        }
        launcher.ignore_kills();

        let started = std::time::Instant::now();
        coordinator.shutdown().await;

        // One grace period for everything, not one per tunnel.
        assert!(started.elapsed() < Duration::from_millis(450));
        assert!((0..3).all(|i| launcher.process(i).control.is_killed()));
        assert!(registry.is_closed());
    }
}
