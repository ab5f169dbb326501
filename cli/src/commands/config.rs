//! Config command - show the effective configuration.

use anyhow::Result;
use podtunnel_core::{ConfigStore, ForwardConfig};

pub fn show(config: &ForwardConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let store = ConfigStore::new()?;
    println!("Config file:        {}", store.config_path().display());
    println!(
        "kubectl:            {}",
        config
            .kubectl_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(search PATH)".to_string())
    );
    println!(
        "Context:            {}",
        config.context.as_deref().unwrap_or("(current)")
    );
    println!("Namespace:          {}", config.namespace);
    println!("Listen address:     {}", config.address);
    println!("Settle delay:       {:?}", config.settle_delay());
    println!(
        "Readiness timeout:  {}",
        config
            .readiness_timeout()
            .map(|t| format!("{:?}", t))
            .unwrap_or_else(|| "none".to_string())
    );
    println!("Shutdown grace:     {:?}", config.shutdown_grace());
    if let Some(patterns) = &config.ready_patterns {
        println!("Ready patterns:     {}", patterns.join(", "));
    }
    if let Some(patterns) = &config.fatal_patterns {
        println!("Fatal patterns:     {}", patterns.join(", "));
    }
    Ok(())
}
