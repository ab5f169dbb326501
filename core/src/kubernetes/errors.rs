//! Errors raised while talking to kubectl.

use thiserror::Error;

/// Result type alias for kubectl operations.
pub type Result<T> = std::result::Result<T, KubectlError>;

/// Errors from kubectl discovery commands.
#[derive(Error, Debug)]
pub enum KubectlError {
    /// kubectl could not be located.
    #[error("kubectl not found")]
    KubectlNotFound,

    /// A kubectl command did not finish in time.
    #[error("kubectl command timed out")]
    Timeout,

    /// The cluster is unreachable or no kubeconfig is set up.
    #[error("Cluster not connected: {0}")]
    ClusterNotConnected(String),

    /// kubectl exited with an error.
    #[error("kubectl failed: {0}")]
    CommandFailed(String),

    /// kubectl output could not be parsed.
    #[error("Failed to parse kubectl output: {0}")]
    ParsingFailed(String),

    /// Invalid discovery arguments.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubectlError {
    /// Maps kubectl's stderr to an error variant.
    pub fn from_kubectl_error(stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        let lower = message.to_lowercase();

        const NOT_CONNECTED: &[&str] = &[
            "connection refused",
            "no configuration has been provided",
            "dial tcp",
            "unable to connect to the server",
            "the server could not find the requested resource",
        ];

        if NOT_CONNECTED.iter().any(|s| lower.contains(s)) {
            Self::ClusterNotConnected(message)
        } else {
            Self::CommandFailed(message)
        }
    }

    pub fn is_cluster_not_connected(&self) -> bool {
        matches!(self, Self::ClusterNotConnected(_))
    }
}
