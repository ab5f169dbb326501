//! CLI subcommands.

pub mod config;
pub mod forward;
pub mod ports;

use std::path::PathBuf;

use anyhow::{Context, Result};
use podtunnel_core::{ConfigStore, ForwardConfig};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub namespace: Option<String>,
    pub context: Option<String>,
    pub kubectl: Option<PathBuf>,
}

/// Loads `~/.podtunnel/config.json` and applies the overrides.
pub async fn load_config(overrides: Overrides) -> Result<ForwardConfig> {
    let store = ConfigStore::new()?;
    let mut config = store
        .load()
        .await
        .with_context(|| format!("loading {}", store.config_path().display()))?;

    if let Some(namespace) = overrides.namespace {
        config.namespace = namespace;
    }
    if overrides.context.is_some() {
        config.context = overrides.context;
    }
    if overrides.kubectl.is_some() {
        config.kubectl_path = overrides.kubectl;
    }

    config.validate()?;
    Ok(config)
}
