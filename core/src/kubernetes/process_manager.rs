//! Supervision of port-forward processes.
//!
//! Each tunnel is driven by a background task that reads the forwarding
//! process's output and moves the tunnel through
//! `Pending -> Active -> Terminated` (or straight from `Pending` to
//! `Terminated` when the process dies first).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::command::PortForwardCommand;
use crate::domain::{TunnelDescriptor, TunnelKey, TunnelStatus};
use crate::error::{Error, Result};
use crate::ports::{
    LineClass, ProcessControl, ProcessExit, ProcessHandle, ProcessLauncher, ReadinessDetector,
};

/// Called once when a tunnel's process has exited, before the tunnel is
/// marked terminated.
pub type CloseHook = Box<dyn FnOnce(&Tunnel) + Send>;

// ============================================================================
// Tunnel
// ============================================================================

/// A live tunnel. Owns the kill switch of its forwarding process.
#[derive(Debug)]
pub struct Tunnel {
    id: Uuid,
    key: TunnelKey,
    local_port: u16,
    control: ProcessControl,
    status: watch::Sender<TunnelStatus>,
}

impl Tunnel {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &TunnelKey {
        &self.key
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn status(&self) -> TunnelStatus {
        *self.status.borrow()
    }

    pub fn pid(&self) -> Option<u32> {
        self.control.pid()
    }

    /// True while the process is neither killed nor exited.
    pub fn is_live(&self) -> bool {
        !self.control.is_killed() && !self.status().is_terminated()
    }

    /// Requests termination of the forwarding process.
    ///
    /// Returns false if the process was already being killed.
    pub fn kill(&self) -> bool {
        self.control.kill()
    }

    pub fn is_killed(&self) -> bool {
        self.control.is_killed()
    }

    /// Completes once the forwarding process has exited.
    pub async fn closed(&self) {
        let mut status = self.status.subscribe();
        let _ = status.wait_for(|s| s.is_terminated()).await;
    }

    pub fn descriptor(&self) -> TunnelDescriptor {
        TunnelDescriptor {
            id: self.id,
            target: self.key.target.clone(),
            remote_port: self.key.remote_port,
            local_port: self.local_port,
            status: self.status(),
            pid: self.control.pid(),
        }
    }
}

/// Completion signal of a pending tunnel.
pub struct Readiness {
    rx: oneshot::Receiver<Result<()>>,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Spawns forwarding processes and tracks their readiness.
pub struct TunnelProcessSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    detector: Arc<dyn ReadinessDetector>,
    command: PortForwardCommand,
    settle_delay: Duration,
    readiness_timeout: Option<Duration>,
}

impl TunnelProcessSupervisor {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        detector: Arc<dyn ReadinessDetector>,
        command: PortForwardCommand,
    ) -> Self {
        Self {
            launcher,
            detector,
            command,
            settle_delay: Duration::ZERO,
            readiness_timeout: None,
        }
    }

    /// Delay between the readiness marker and resolving the caller.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Bound on the wait for the readiness marker.
    pub fn with_readiness_timeout(mut self, readiness_timeout: Option<Duration>) -> Self {
        self.readiness_timeout = readiness_timeout;
        self
    }

    /// Spawns a tunnel and waits until it is active.
    pub async fn spawn(&self, key: TunnelKey, local_port: u16) -> Result<Arc<Tunnel>> {
        let (tunnel, readiness) = self.start(key, local_port, Box::new(|_: &Tunnel| {}))?;
        self.wait_ready(&tunnel, readiness).await?;
        Ok(tunnel)
    }

    /// Spawns the forwarding process for `key` without waiting for readiness.
    ///
    /// The returned tunnel is `Pending`; `on_close` runs when its process exits.
    pub fn start(
        &self,
        key: TunnelKey,
        local_port: u16,
        on_close: CloseHook,
    ) -> Result<(Arc<Tunnel>, Readiness)> {
        let args = self.command.args(&key, local_port);
        debug!(
            resource = %key.target,
            remote_port = key.remote_port,
            local_port,
            "starting port forward"
        );

        let ProcessHandle {
            control,
            lines,
            exit,
        } = self.launcher.launch(self.command.program(), &args)?;

        let (status, _) = watch::channel(TunnelStatus::Pending);
        let tunnel = Arc::new(Tunnel {
            id: Uuid::new_v4(),
            key,
            local_port,
            control,
            status,
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(drive(
            tunnel.clone(),
            lines,
            exit,
            self.detector.clone(),
            self.settle_delay,
            ready_tx,
            on_close,
        ));

        Ok((tunnel, Readiness { rx: ready_rx }))
    }

    /// Waits for a started tunnel to become active.
    ///
    /// On timeout the process is killed.
    pub async fn wait_ready(&self, tunnel: &Tunnel, readiness: Readiness) -> Result<()> {
        let outcome = match self.readiness_timeout {
            Some(limit) => match timeout(limit, readiness.rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        resource = %tunnel.key.target,
                        remote_port = tunnel.key.remote_port,
                        "no readiness marker before timeout, killing port forward"
                    );
                    tunnel.kill();
                    return Err(Error::ReadinessTimeout {
                        target: tunnel.key.target.to_string(),
                        remote_port: tunnel.key.remote_port,
                        waited: limit,
                    });
                }
            },
            None => readiness.rx.await,
        };

        outcome.unwrap_or_else(|_| {
            Err(Error::ProcessFailed(
                "supervisor stopped before the port forward became ready".to_string(),
            ))
        })
    }
}

async fn drive(
    tunnel: Arc<Tunnel>,
    mut lines: mpsc::Receiver<String>,
    mut exit_rx: oneshot::Receiver<ProcessExit>,
    detector: Arc<dyn ReadinessDetector>,
    settle_delay: Duration,
    ready_tx: oneshot::Sender<Result<()>>,
    on_close: CloseHook,
) {
    let mut ready_tx = Some(ready_tx);
    let mut transcript: Vec<String> = Vec::new();
    let mut lines_open = true;

    let exit = loop {
        tokio::select! {
            biased;

            line = lines.recv(), if lines_open => {
                let Some(line) = line else {
                    lines_open = false;
                    continue;
                };

                match detector.classify(&line) {
                    LineClass::Ready => {
                        if let Some(tx) = ready_tx.take() {
                            tunnel.status.send_replace(TunnelStatus::Active);
                            info!(
                                resource = %tunnel.key.target,
                                remote_port = tunnel.key.remote_port,
                                local_port = tunnel.local_port,
                                "port forward ready"
                            );
                            if !settle_delay.is_zero() {
                                tokio::time::sleep(settle_delay).await;
                            }
                            let _ = tx.send(Ok(()));
                        }
                    }
                    LineClass::Fatal => {
                        warn!(
                            resource = %tunnel.key.target,
                            remote_port = tunnel.key.remote_port,
                            line = %line,
                            "port forward broken, terminating"
                        );
                        tunnel.kill();
                    }
                    LineClass::Noise => {
                        trace!(resource = %tunnel.key.target, line = %line, "port forward output");
                    }
                }
                transcript.push(line);
            }

            exit = &mut exit_rx => {
                break exit.unwrap_or_else(|_| {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "process launcher dropped the exit notification",
                    ))
                });
            }
        }
    };

    while let Ok(line) = lines.try_recv() {
        transcript.push(line);
    }

    if let Err(e) = &exit {
        warn!(resource = %tunnel.key.target, error = %e, "port forward process failed");
        tunnel.kill();
    }

    on_close(tunnel.as_ref());
    tunnel.status.send_replace(TunnelStatus::Terminated);

    let Some(tx) = ready_tx.take() else {
        info!(
            resource = %tunnel.key.target,
            remote_port = tunnel.key.remote_port,
            local_port = tunnel.local_port,
            ?exit,
            "port forward closed"
        );
        return;
    };

    let error = match exit {
        Ok(exit_code) => Error::CreationFailed {
            target: tunnel.key.target.to_string(),
            remote_port: tunnel.key.remote_port,
            exit_code,
            output: transcript.join("\n"),
        },
        Err(e) => Error::ProcessFailed(e.to_string()),
    };
    debug!(resource = %tunnel.key.target, error = %error, "port forward failed to start");
    let _ = tx.send(Err(error));
}
