//! Tokio child-process launcher.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::ports::{ProcessControl, ProcessExit, ProcessHandle, ProcessLauncher};

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// Upper bound on waiting for output pipes after exit (grandchildren may hold them open).
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lines buffered between the pipe readers and the supervisor.
const LINE_BUFFER: usize = 256;

/// Launches forwarding processes as tokio child processes.
///
/// Children are spawned with `kill_on_drop`, so they do not outlive the
/// supervising task if the host process unwinds.
pub struct TokioProcessLauncher {
    kill_grace_period: Duration,
}

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self {
            kill_grace_period: DEFAULT_KILL_GRACE_PERIOD,
        }
    }

    pub fn with_kill_grace_period(kill_grace_period: Duration) -> Self {
        Self { kill_grace_period }
    }
}

impl Default for TokioProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<ProcessHandle> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        debug!(program = %program.display(), ?pid, "spawned forwarding process");

        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, line_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, line_tx)));
        }

        let control = ProcessControl::new(pid);
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(supervise_child(
            child,
            control.clone(),
            readers,
            exit_tx,
            self.kill_grace_period,
        ));

        Ok(ProcessHandle {
            control,
            lines: line_rx,
            exit: exit_rx,
        })
    }
}

async fn forward_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                trace!(error = %e, "stopped reading process output");
                break;
            }
        }
    }
}

async fn supervise_child(
    mut child: Child,
    control: ProcessControl,
    readers: Vec<JoinHandle<()>>,
    exit_tx: oneshot::Sender<ProcessExit>,
    grace: Duration,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = control.killed() => None,
    };

    let status = match exited {
        Some(status) => status,
        None => terminate(&mut child, grace).await,
    };

    for reader in readers {
        if timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
            trace!(pid = ?control.pid(), "output pipe still open after exit");
        }
    }

    let exit = status.map(|s| s.code());
    debug!(pid = ?control.pid(), ?exit, "forwarding process exited");
    let _ = exit_tx.send(exit);
}

/// Stops a child gracefully (SIGTERM on unix), force-killing it after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if send_sigterm(child) {
        if let Ok(status) = timeout(grace, child.wait()).await {
            return status;
        }
        debug!(pid = ?child.id(), "process ignored SIGTERM, killing");
    }

    if let Err(e) = child.start_kill() {
        warn!(pid = ?child.id(), error = %e, "failed to kill forwarding process");
    }
    child.wait().await
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}
