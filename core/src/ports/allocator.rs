//! Local port allocator port (interface).

use crate::error::Result;

/// Port for choosing the local end of a tunnel.
///
/// Every call must return a port that is free at the time of the call; a port
/// handed out once is never assumed to still be free later.
pub trait PortAllocator: Send + Sync {
    /// Allocate a free local TCP port.
    fn allocate(&self) -> Result<u16>;
}
