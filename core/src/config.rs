//! Port-forward settings.
//!
//! Stored as JSON at `~/.podtunnel/config.json`. Missing fields fall back to
//! their defaults, so an empty object is a valid configuration.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::adapters::PatternReadinessDetector;
use crate::adapters::readiness::{KUBECTL_FATAL_PATTERNS, KUBECTL_READY_PATTERNS};
use crate::error::{Error, Result};

/// Settings for discovery and tunnel supervision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardConfig {
    /// Explicit kubectl binary. Searched for when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubectl_path: Option<PathBuf>,

    /// kubeconfig context. The current context when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Namespace the tunnels and discovery run against.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Local address the forwarding tool listens on.
    #[serde(default = "default_address")]
    pub address: String,

    /// Delay between the readiness marker and handing out the tunnel.
    ///
    /// kubectl can print the marker slightly before the listener accepts
    /// connections. Whether this is still needed is unverified.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Bound on waiting for the readiness marker. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_timeout_secs: Option<u64>,

    /// How long shutdown waits for each tunnel process to exit.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Regexes marking a ready tunnel. kubectl's markers when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_patterns: Option<Vec<String>>,

    /// Regexes marking a broken tunnel. kubectl's markers when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_patterns: Option<Vec<String>>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            kubectl_path: None,
            context: None,
            namespace: default_namespace(),
            address: default_address(),
            settle_delay_ms: default_settle_delay_ms(),
            readiness_timeout_secs: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            ready_patterns: None,
            fatal_patterns: None,
        }
    }
}

impl ForwardConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn readiness_timeout(&self) -> Option<Duration> {
        self.readiness_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// The local address tunnels listen on.
    pub fn listen_address(&self) -> Result<IpAddr> {
        self.address
            .parse()
            .map_err(|_| Error::Config(format!("Invalid listen address '{}'", self.address)))
    }

    /// Checks values that would otherwise only fail once kubectl runs.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_namespace(&self.namespace) {
            return Err(Error::Config(format!(
                "Invalid namespace '{}'",
                self.namespace
            )));
        }
        self.listen_address()?;
        if matches!(self.readiness_timeout_secs, Some(0)) {
            return Err(Error::Config(
                "Readiness timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the readiness detector, honouring pattern overrides.
    pub fn readiness_detector(&self) -> Result<PatternReadinessDetector> {
        if self.ready_patterns.is_none() && self.fatal_patterns.is_none() {
            return Ok(PatternReadinessDetector::kubectl());
        }

        let ready: Vec<String> = match &self.ready_patterns {
            Some(patterns) => patterns.clone(),
            None => KUBECTL_READY_PATTERNS.iter().map(|p| p.to_string()).collect(),
        };
        let fatal: Vec<String> = match &self.fatal_patterns {
            Some(patterns) => patterns.clone(),
            None => KUBECTL_FATAL_PATTERNS.iter().map(|p| p.to_string()).collect(),
        };
        PatternReadinessDetector::new(&ready, &fatal)
    }
}

/// RFC 1123 label: lowercase alphanumerics and '-', at most 63 characters.
pub(crate) fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace.len() <= 63
        && namespace
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !namespace.starts_with('-')
        && !namespace.ends_with('-')
}

/// Configuration store for the port-forward settings.
///
/// Handles reading and writing configuration to `~/.podtunnel/config.json`.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.podtunnel/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".podtunnel").join("config.json"),
        })
    }

    /// Create a config store with a custom path (for testing).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk.
    ///
    /// Returns default config if the file doesn't exist.
    pub async fn load(&self) -> Result<ForwardConfig> {
        if !self.config_path.exists() {
            return Ok(ForwardConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, config: &ForwardConfig) -> Result<()> {
        if let Some(config_dir) = self.config_path.parent() {
            fs::create_dir_all(config_dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }
}
