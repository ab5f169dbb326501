//! In-memory process launcher and port allocator for tunnel tests.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::ports::{PortAllocator, ProcessControl, ProcessExit, ProcessHandle, ProcessLauncher};

/// What a fake process does as soon as it is launched.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    /// Prints kubectl's forwarding marker and keeps running.
    Ready,
    /// Prints `output` and exits with `code`.
    Exit {
        code: Option<i32>,
        output: Vec<String>,
    },
    /// Prints nothing and keeps running.
    Silent,
    /// Fails to start.
    SpawnError,
}

/// A launched fake process. Exits with no code once killed.
#[derive(Clone)]
pub(crate) struct FakeProcess {
    pub args: Vec<String>,
    pub control: ProcessControl,
    lines: mpsc::Sender<String>,
    exit: Arc<Mutex<Option<oneshot::Sender<ProcessExit>>>>,
}

impl FakeProcess {
    pub async fn emit(&self, line: &str) {
        let _ = self.lines.send(line.to_string()).await;
    }

    pub fn exit(&self, code: Option<i32>) {
        self.finish(Ok(code));
    }

    pub fn fail(&self, error: io::Error) {
        self.finish(Err(error));
    }

    fn finish(&self, exit: ProcessExit) {
        if let Some(tx) = self.exit.lock().take() {
            let _ = tx.send(exit);
        }
    }
}

pub(crate) struct FakeLauncher {
    behavior: Mutex<Behavior>,
    processes: Mutex<Vec<FakeProcess>>,
    exit_on_kill: Arc<AtomicBool>,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            processes: Mutex::new(Vec::new()),
            exit_on_kill: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    /// Killed processes stay running from now on.
    pub fn ignore_kills(&self) {
        self.exit_on_kill.store(false, Ordering::SeqCst);
    }

    /// Number of processes launched so far.
    pub fn launches(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn process(&self, index: usize) -> FakeProcess {
        self.processes.lock()[index].clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<ProcessHandle> {
        let behavior = self.behavior.lock().clone();
        if let Behavior::SpawnError = behavior {
            return Err(Error::Spawn {
                program: program.display().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
            });
        }

        let mut processes = self.processes.lock();
        let pid = 1000 + processes.len() as u32;

        let (lines_tx, lines_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let process = FakeProcess {
            args: args.to_vec(),
            control: ProcessControl::new(Some(pid)),
            lines: lines_tx,
            exit: Arc::new(Mutex::new(Some(exit_tx))),
        };

        match behavior {
            Behavior::Ready => {
                let ports = args.last().cloned().unwrap_or_default();
                let (local, remote) = ports.split_once(':').unwrap_or(("0", "0"));
                let _ = process
                    .lines
                    .try_send(format!("Forwarding from 127.0.0.1:{local} -> {remote}"));
            }
            Behavior::Exit { code, output } => {
                for line in output {
                    let _ = process.lines.try_send(line);
                }
                process.exit(code);
            }
            Behavior::Silent | Behavior::SpawnError => {}
        }

        let on_kill = process.clone();
        let exit_on_kill = self.exit_on_kill.clone();
        tokio::spawn(async move {
            on_kill.control.killed().await;
            if exit_on_kill.load(Ordering::SeqCst) {
                on_kill.exit(None);
            }
        });

        let handle = ProcessHandle {
            control: process.control.clone(),
            lines: lines_rx,
            exit: exit_rx,
        };
        processes.push(process);
        Ok(handle)
    }
}

/// Hands out increasing ports starting at 40000.
pub(crate) struct SequentialPortAllocator {
    next: AtomicU16,
}

impl SequentialPortAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU16::new(40000),
        })
    }
}

impl PortAllocator for SequentialPortAllocator {
    fn allocate(&self) -> Result<u16> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
