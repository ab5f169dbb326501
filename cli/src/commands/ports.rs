//! Ports command - show the forwardable ports of a namespace.

use anyhow::Result;
use podtunnel_core::{ForwardConfig, PortForwardManager};

pub async fn run(config: ForwardConfig, json: bool) -> Result<()> {
    let namespace = config.namespace.clone();
    let manager = PortForwardManager::new(config)?;
    let ports = manager.fetch_forwardable_ports(None).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No forwardable ports found in namespace {}.", namespace);
        return Ok(());
    }

    // Table header
    println!("{:<40} {:<28} PROTOCOL", "TARGET", "PORT");
    println!("{}", "-".repeat(78));

    for port in &ports {
        println!(
            "{:<40} {:<28} {}",
            truncate(&port.target_name, 40),
            truncate(&port.display_name(), 28),
            port.protocol
        );
    }

    println!("\nTotal: {} ports in namespace {}", ports.len(), namespace);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
