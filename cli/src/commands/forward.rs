//! Forward command - keep a tunnel open until Ctrl-C.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{bail, Result};
use podtunnel_core::{ForwardConfig, PortForwardManager, TunnelDescriptor};
use tracing::info;

/// Pause before re-establishing a tunnel that died.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub async fn run(
    config: ForwardConfig,
    target: &str,
    port: u16,
    keep_alive: bool,
    json: bool,
) -> Result<()> {
    let manager = PortForwardManager::new(config)?;
    let result = forward_until_interrupted(&manager, target, port, keep_alive, json).await;
    manager.shutdown().await;
    result
}

async fn forward_until_interrupted(
    manager: &PortForwardManager,
    target: &str,
    port: u16,
    keep_alive: bool,
    json: bool,
) -> Result<()> {
    let address = manager.config().listen_address()?;
    loop {
        let tunnel = tokio::select! {
            tunnel = manager.acquire_tunnel(target, port) => tunnel?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        print_forward(address, &tunnel.descriptor(), json)?;

        tokio::select! {
            _ = tunnel.closed() => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }

        if !keep_alive {
            bail!("Port forward to {} closed", tunnel.key());
        }
        info!(key = %tunnel.key(), "port forward closed, reconnecting");
        eprintln!("Port forward closed, reconnecting...");

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn print_forward(address: IpAddr, descriptor: &TunnelDescriptor, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(descriptor)?);
        return Ok(());
    }

    println!("{}", describe_forward(address, descriptor));
    println!("Press Ctrl-C to stop.");
    Ok(())
}

fn describe_forward(address: IpAddr, descriptor: &TunnelDescriptor) -> String {
    format!(
        "Forwarding {} -> {}:{} ({}, pid {})",
        SocketAddr::new(address, descriptor.local_port),
        descriptor.target,
        descriptor.remote_port,
        descriptor.status.as_str(),
        descriptor
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    )
}
