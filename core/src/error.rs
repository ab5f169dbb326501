//! Error types for the podtunnel-core library.

use std::time::Duration;

use thiserror::Error;

use crate::kubernetes::errors::KubectlError;

/// Result type alias for podtunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering ports and managing tunnels.
#[derive(Error, Debug)]
pub enum Error {
    /// The forwarding process closed before the tunnel became active.
    #[error(
        "Port forward to {target}:{remote_port} closed before becoming ready (exit code {}): {output}",
        display_exit_code(.exit_code)
    )]
    CreationFailed {
        target: String,
        remote_port: u16,
        exit_code: Option<i32>,
        output: String,
    },

    /// The forwarding process could not be started at all.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The forwarding process failed at the OS level after starting.
    #[error("Port forward process failed: {0}")]
    ProcessFailed(String),

    /// No readiness marker was seen within the configured bound.
    #[error("Port forward to {target}:{remote_port} not ready after {waited:?}")]
    ReadinessTimeout {
        target: String,
        remote_port: u16,
        waited: Duration,
    },

    /// The target resource kind cannot be port-forwarded.
    #[error("Unsupported port forward target: {0}")]
    UnsupportedTarget(String),

    /// Invalid arguments or configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tunnel creation was requested after shutdown began.
    #[error("Port forward manager is shut down")]
    ShutDown,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Kubernetes/kubectl error.
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] KubectlError),
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}
