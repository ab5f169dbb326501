//! `kubectl port-forward` command line construction.

use std::path::{Path, PathBuf};

use crate::config::ForwardConfig;
use crate::domain::TunnelKey;

/// Builds the forwarding process invocation for a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortForwardCommand {
    program: PathBuf,
    namespace: String,
    context: Option<String>,
    address: String,
}

impl PortForwardCommand {
    pub fn new(program: PathBuf, namespace: impl Into<String>) -> Self {
        Self {
            program,
            namespace: namespace.into(),
            context: None,
            address: "127.0.0.1".to_string(),
        }
    }

    pub fn from_config(program: PathBuf, config: &ForwardConfig) -> Self {
        Self {
            program,
            namespace: config.namespace.clone(),
            context: config.context.clone(),
            address: config.address.clone(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments forwarding `local_port` to the key's remote port.
    pub fn args(&self, key: &TunnelKey, local_port: u16) -> Vec<String> {
        let mut args = vec![
            "port-forward".to_string(),
            "--namespace".to_string(),
            self.namespace.clone(),
        ];
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args.push("--address".to_string());
        args.push(self.address.clone());
        args.push(key.target.to_string());
        args.push(format!("{}:{}", local_port, key.remote_port));
        args
    }
}
