//! podtunnel CLI - Port forwards into a Kubernetes cluster
//!
//! A command-line tool for listing forwardable ports and keeping
//! kubectl port-forward tunnels open.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::Overrides;

#[derive(Parser)]
#[command(name = "podtunnel")]
#[command(author, version, about = "Port forwards into a Kubernetes cluster")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Namespace to work in (overrides the config file)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Path to the kubectl binary
    #[arg(long, global = true)]
    kubectl: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward a local port to a resource, e.g. `Service/web 8080`
    #[command(alias = "fwd")]
    Forward {
        /// Target resource as <Kind>/<name>
        target: String,

        /// Remote port on the target
        port: u16,

        /// Re-establish the tunnel whenever it dies
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// List the forwardable ports of the namespace
    #[command(alias = "ls")]
    Ports,

    /// Show the effective configuration
    Config,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("podtunnel={level},podtunnel_core={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = Overrides {
        namespace: cli.namespace,
        context: cli.context,
        kubectl: cli.kubectl,
    };
    let config = commands::load_config(overrides).await?;

    match cli.command {
        Commands::Forward {
            target,
            port,
            keep_alive,
        } => {
            commands::forward::run(config, &target, port, keep_alive, cli.json).await?;
        }
        Commands::Ports => {
            commands::ports::run(config, cli.json).await?;
        }
        Commands::Config => {
            commands::config::show(&config, cli.json)?;
        }
    }

    Ok(())
}
