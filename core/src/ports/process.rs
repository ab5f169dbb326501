//! Process launcher port (interface).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::Result;

/// How a forwarding process ended: its exit code (`None` when killed by a
/// signal) or the OS-level error that ended supervision.
pub type ProcessExit = std::io::Result<Option<i32>>;

/// Port for launching external forwarding processes.
///
/// Implementations must deliver every output line before reporting the exit,
/// and must kill the process if the launcher side is dropped.
pub trait ProcessLauncher: Send + Sync {
    /// Start `program` with `args`.
    ///
    /// Fails with [`crate::Error::Spawn`] when the process cannot be started.
    fn launch(&self, program: &Path, args: &[String]) -> Result<ProcessHandle>;
}

/// A running process as seen by its supervisor.
pub struct ProcessHandle {
    /// Kill switch shared with whoever owns the tunnel.
    pub control: ProcessControl,
    /// Combined stdout/stderr, one line per message.
    pub lines: mpsc::Receiver<String>,
    /// Resolves once the process has exited and its output is drained.
    pub exit: oneshot::Receiver<ProcessExit>,
}

/// Cloneable kill switch for a process.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    pid: Option<u32>,
    inner: Arc<KillSwitch>,
}

#[derive(Debug, Default)]
struct KillSwitch {
    killed: AtomicBool,
    notify: Notify,
}

impl ProcessControl {
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            inner: Arc::new(KillSwitch::default()),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Requests termination. Returns false if a kill was already requested.
    pub fn kill(&self) -> bool {
        if self.inner.killed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    /// Completes once [`ProcessControl::kill`] has been called.
    pub async fn killed(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_killed() {
                return;
            }
            notified.await;
        }
    }
}
