//! Registry of live tunnels keyed by target and remote port.
//!
//! Creation is serialized per key: concurrent acquires for the same key share
//! one forwarding process, while unrelated keys are created in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Mutex as CreationLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::process_manager::{Tunnel, TunnelProcessSupervisor};
use crate::domain::{TunnelDescriptor, TunnelKey};
use crate::error::{Error, Result};
use crate::ports::PortAllocator;

type TunnelMap = Mutex<HashMap<TunnelKey, Arc<Tunnel>>>;

/// Concurrency-safe cache holding at most one live tunnel per key.
pub struct TunnelRegistry {
    supervisor: TunnelProcessSupervisor,
    allocator: Arc<dyn PortAllocator>,
    tunnels: Arc<TunnelMap>,
    /// One lock per key with a creation in flight or a live tunnel.
    creation_locks: Mutex<HashMap<TunnelKey, Arc<CreationLock<()>>>>,
    closed: AtomicBool,
}

impl TunnelRegistry {
    pub fn new(supervisor: TunnelProcessSupervisor, allocator: Arc<dyn PortAllocator>) -> Self {
        Self {
            supervisor,
            allocator,
            tunnels: Arc::new(Mutex::new(HashMap::new())),
            creation_locks: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the live tunnel for `key`, creating one if needed.
    ///
    /// Suspends until the tunnel is active. On failure nothing is cached, so
    /// the next call spawns a new process.
    pub async fn acquire(&self, key: &TunnelKey) -> Result<TunnelDescriptor> {
        Ok(self.acquire_tunnel(key).await?.descriptor())
    }

    /// Like [`TunnelRegistry::acquire`], returning the tunnel handle itself.
    pub async fn acquire_tunnel(&self, key: &TunnelKey) -> Result<Arc<Tunnel>> {
        if self.is_closed() {
            return Err(Error::ShutDown);
        }

        let lock = self.creation_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.acquire_locked(key).await
        };
        drop(lock);
        self.prune_creation_lock(key);
        result
    }

    async fn acquire_locked(&self, key: &TunnelKey) -> Result<Arc<Tunnel>> {
        // Shutdown may have started while waiting for the lock.
        if self.is_closed() {
            return Err(Error::ShutDown);
        }

        if let Some(tunnel) = self.tunnel(key) {
            debug!(key = %key, local_port = tunnel.local_port(), "reusing port forward");
            return Ok(tunnel);
        }

        let local_port = self.allocator.allocate()?;
        let tunnels = Arc::downgrade(&self.tunnels);
        let (tunnel, readiness) = self.supervisor.start(
            key.clone(),
            local_port,
            Box::new(move |closed: &Tunnel| remove_closed(&tunnels, closed)),
        )?;
        self.tunnels.lock().insert(key.clone(), tunnel.clone());

        if let Err(e) = self.supervisor.wait_ready(&tunnel, readiness).await {
            remove_if_same(&self.tunnels, key, tunnel.id());
            tunnel.kill();
            return Err(e);
        }

        info!(key = %key, local_port, "port forward established");
        Ok(tunnel)
    }

    /// Removes `key` and kills its process.
    ///
    /// Returns false if no tunnel was registered for the key.
    pub fn release(&self, key: &TunnelKey) -> bool {
        let Some(tunnel) = self.tunnels.lock().remove(key) else {
            return false;
        };
        debug!(key = %key, pid = ?tunnel.pid(), "releasing port forward");
        tunnel.kill();
        self.prune_creation_lock(key);
        true
    }

    /// The registered tunnel for `key`, if its process is still live.
    pub fn tunnel(&self, key: &TunnelKey) -> Option<Arc<Tunnel>> {
        self.tunnels
            .lock()
            .get(key)
            .filter(|tunnel| tunnel.is_live())
            .cloned()
    }

    /// Snapshots of every registered tunnel, ordered by key.
    pub fn forwards(&self) -> Vec<TunnelDescriptor> {
        let mut forwards: Vec<TunnelDescriptor> = self
            .tunnels
            .lock()
            .values()
            .map(|tunnel| tunnel.descriptor())
            .collect();
        forwards.sort_by_key(|d| d.key().to_string());
        forwards
    }

    /// Every registered tunnel, live or not.
    pub fn all_tunnels(&self) -> Vec<Arc<Tunnel>> {
        self.tunnels.lock().values().cloned().collect()
    }

    /// Stops accepting new tunnels. Returns false if already closed.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn creation_lock(&self, key: &TunnelKey) -> Arc<CreationLock<()>> {
        self.creation_locks
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Drops the lock for `key` once nobody waits on it and no tunnel is live.
    fn prune_creation_lock(&self, key: &TunnelKey) {
        let mut locks = self.creation_locks.lock();
        let idle = locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle && self.tunnel(key).is_none() {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn creation_lock_count(&self) -> usize {
        self.creation_locks.lock().len()
    }
}

fn remove_closed(tunnels: &Weak<TunnelMap>, closed: &Tunnel) {
    if let Some(tunnels) = tunnels.upgrade() {
        if remove_if_same(&tunnels, closed.key(), closed.id()) {
            debug!(key = %closed.key(), "port forward closed, removed from registry");
        }
    }
}

/// Removes the entry for `key` only if it still belongs to tunnel `id`.
///
/// A replacement tunnel registered under the same key is left alone.
fn remove_if_same(tunnels: &TunnelMap, key: &TunnelKey, id: Uuid) -> bool {
    let mut tunnels = tunnels.lock();
    if tunnels.get(key).is_some_and(|t| t.id() == id) {
        tunnels.remove(key);
        return true;
    }
    false
}
