//! Ephemeral local port allocation.

use std::net::{IpAddr, SocketAddr, TcpListener};

use tracing::trace;

use crate::error::Result;
use crate::ports::PortAllocator;

/// Asks the OS for a free port by binding port 0 on the listen address.
///
/// The listener is closed immediately, so the forwarding tool can bind the
/// port right after.
#[derive(Debug)]
pub struct EphemeralPortAllocator {
    address: IpAddr,
}

impl EphemeralPortAllocator {
    /// Allocates ports on `address`, the address the forwarding tool binds.
    pub fn new(address: IpAddr) -> Self {
        Self { address }
    }
}

impl PortAllocator for EphemeralPortAllocator {
    fn allocate(&self) -> Result<u16> {
        let listener = TcpListener::bind(SocketAddr::new(self.address, 0))?;
        let port = listener.local_addr()?.port();
        trace!(address = %self.address, port, "allocated ephemeral port");
        Ok(port)
    }
}
