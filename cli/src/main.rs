// dsdv-mesh: command-line front end for the DSDV mesh core
//
// Runs whole meshes on the in-memory radio medium and manages the
// protocol configuration file.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use config::{Config, Topology};
use dsdv_mesh_core::routing::TableDisplay;
use dsdv_mesh_core::{Medium, NodeAddress, NodeEvent, SimNode};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "dsdv-mesh")]
#[command(about = "DSDV mesh routing over a one-hop broadcast radio", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "info" or "dsdv_mesh_core=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mesh of nodes on the in-memory medium
    Simulate {
        /// Number of nodes
        #[arg(short, long)]
        nodes: Option<usize>,
        /// How the nodes are linked
        #[arg(short, long, value_enum)]
        topology: Option<Topology>,
        /// Broadcast periods to run before printing tables
        #[arg(short, long)]
        periods: Option<u64>,
        /// Broadcast period in milliseconds
        #[arg(long)]
        period_ms: Option<u64>,
        /// Send this text from the first node once converged
        #[arg(short, long)]
        message: Option<String>,
        /// Destination of --message, e.g. 02:00:00:00:00:03 (default: last node)
        #[arg(long, requires = "message")]
        to: Option<NodeAddress>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print every setting
    Show,
    /// Print the config file location
    Path,
    /// Change one setting
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            nodes,
            topology,
            periods,
            period_ms,
            message,
            to,
        } => cmd_simulate(nodes, topology, periods, period_ms, message, to).await,
        Commands::Config { action } => cmd_config(action),
    }
}

/// Address of the `index`-th simulated node (locally administered)
fn sim_address(index: usize) -> NodeAddress {
    NodeAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, index as u8 + 1])
}

async fn cmd_simulate(
    nodes: Option<usize>,
    topology: Option<Topology>,
    periods: Option<u64>,
    period_ms: Option<u64>,
    message: Option<String>,
    to: Option<NodeAddress>,
) -> Result<()> {
    let config = Config::load()?;
    let count = nodes.unwrap_or(config.simulation.nodes);
    let topology = topology.unwrap_or(config.simulation.topology);
    let periods = periods.unwrap_or(config.simulation.periods);

    if !(2..=254).contains(&count) {
        anyhow::bail!("Node count must be between 2 and 254, got {}", count);
    }

    let mut node_config = config.node.clone();
    if let Some(period_ms) = period_ms {
        node_config.broadcast_period_ms = period_ms;
    }
    node_config.validate().context("Invalid node configuration")?;

    let period = node_config.broadcast_period();
    let duration = run_time(period, periods)?;

    println!("{}", "DSDV mesh simulation".bold());
    println!(
        "  {} nodes, {} topology, {} periods of {} ms",
        count.to_string().bright_cyan(),
        topology.to_string().bright_cyan(),
        periods.to_string().bright_cyan(),
        node_config.broadcast_period_ms
    );
    println!();

    let addresses: Vec<NodeAddress> = (0..count).map(sim_address).collect();
    let medium = Medium::new();
    match topology {
        Topology::Line => medium.connect_line(&addresses),
        Topology::Ring => medium.connect_ring(&addresses),
        Topology::Full => medium.connect_full(&addresses),
    }

    let mut mesh: Vec<SimNode> = Vec::with_capacity(count);
    for &address in &addresses {
        let node = medium
            .spawn_node(node_config.clone(), address)
            .with_context(|| format!("Failed to start node {}", address))?;
        mesh.push(node);
    }

    tokio::time::sleep(duration).await;

    for node in &mesh {
        let entries = node
            .handle
            .routing_table()
            .await
            .context("Node stopped unexpectedly")?;
        println!("{} {}", "Routing table of".bold(), node.handle.address().to_string().bright_cyan());
        print!("{}", TableDisplay::new(&entries, Instant::now()));
        println!();
    }

    if let Some(text) = message {
        let destination = match to {
            Some(address) => address,
            None => *addresses.last().context("Mesh has no nodes")?,
        };
        send_and_confirm(&mut mesh, destination, text, period).await?;
    }

    for node in &mesh {
        let _ = node.handle.shutdown().await;
    }

    Ok(())
}

/// How long `periods` broadcast periods last
fn run_time(period: Duration, periods: u64) -> Result<Duration> {
    let periods = u32::try_from(periods)
        .with_context(|| format!("Too many periods: {}", periods))?;
    period
        .checked_mul(periods)
        .with_context(|| format!("Simulation of {} periods is too long", periods))
}

/// Send `text` from the first node to `destination` and wait for delivery
async fn send_and_confirm(
    mesh: &mut [SimNode],
    destination: NodeAddress,
    text: String,
    period: Duration,
) -> Result<()> {
    let (first, rest) = mesh
        .split_first_mut()
        .context("Mesh has no nodes")?;

    if let Err(err) = first
        .handle
        .send_user_message(destination, text.as_bytes())
        .await
    {
        println!("{} Message not sent: {}", "✗".red(), err);
        return Ok(());
    }

    let Some(target) = rest
        .iter_mut()
        .find(|node| node.handle.address() == destination)
    else {
        println!("{} {} is not part of the mesh", "✗".red(), destination);
        return Ok(());
    };

    let deadline = tokio::time::Instant::now() + period * 2;
    loop {
        match tokio::time::timeout_at(deadline, target.events.recv()).await {
            Ok(Some(NodeEvent::MessageDelivered { from, payload, .. })) => {
                println!(
                    "{} {} received \"{}\" (last hop {})",
                    "✓".green(),
                    destination.to_string().bright_cyan(),
                    String::from_utf8_lossy(&payload),
                    from
                );
                return Ok(());
            }
            Ok(Some(NodeEvent::NeighborLost(neighbor))) => {
                println!("  {} lost neighbor {}", destination, neighbor);
            }
            Ok(None) | Err(_) => {
                println!("{} Message was not delivered", "✗".red());
                return Ok(());
            }
        }
    }
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = Config::load()?;

    match action {
        ConfigAction::Show => {
            println!("{}", "Configuration".bold());
            println!();
            for (key, value) in config.list() {
                println!("  {:<28} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Path => {
            println!("{}", Config::config_file()?.display());
        }

        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }
    }

    Ok(())
}
