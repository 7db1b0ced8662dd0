// citynet — relay gateway and topology tooling
//
// `serve` runs the WebSocket gateway in front of the core network. The other
// commands work offline against a topology file.

mod config;
mod server;
mod topology;

use anyhow::{Context, Result};
use citynet_core::codec::huffman;
use citynet_core::{CityNetwork, RoutingEngine};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use topology::TopologyFile;

#[derive(Parser)]
#[command(name = "citynet")]
#[command(about = "CityNet — encrypted relay over a spanning-tree city network", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket relay gateway
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// Topology file to load before accepting connections
        #[arg(short, long)]
        topology: Option<PathBuf>,
    },
    /// Query the tree route between two cities
    Route {
        topology: PathBuf,
        from: String,
        to: String,
    },
    /// Summarize a topology file and its spanning tree
    Status { topology: PathBuf },
    /// Show the prefix code table and bit-string for a text
    Encode { text: String },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve { port, topology } => cmd_serve(cli.config, port, topology).await,
        Commands::Route { topology, from, to } => cmd_route(&topology, &from, &to),
        Commands::Status { topology } => cmd_status(&topology),
        Commands::Encode { text } => cmd_encode(&text),
        Commands::Config => cmd_config(cli.config),
    }
}

fn load_engine(path: &Path) -> Result<RoutingEngine> {
    let file = TopologyFile::read(path)?;
    let mut engine = RoutingEngine::new();
    engine
        .load(file.cities, file.edges)
        .context("Topology rejected")?;
    Ok(engine)
}

async fn cmd_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    topology: Option<PathBuf>,
) -> Result<()> {
    let config = config::Config::load(config_path.as_deref())?;
    let port = port.unwrap_or(config.listen_port);
    let network = CityNetwork::new(config.relay.clone());

    println!("{}", "CityNet — Starting...".bold());
    println!();

    let topology = topology.or_else(|| config.topology_path.as_ref().map(PathBuf::from));
    if let Some(path) = topology {
        let file = TopologyFile::read(&path)?;
        let summary = network
            .load_topology(file.cities, file.edges)
            .context("Topology rejected")?;
        println!(
            "  {} Topology: {} cities, {} edges, {} tree edges",
            "✓".green(),
            summary.city_count,
            summary.edge_count,
            summary.mst_edge_count
        );
    } else {
        println!("  {} No topology loaded; encrypted sends will be refused", "!".yellow());
    }

    println!(
        "  {} Monitor identity: {}",
        "✓".green(),
        config.relay.monitor_city.bright_cyan()
    );
    println!(
        "  {} Gateway: {}",
        "✓".green(),
        format!("ws://0.0.0.0:{}/ws/<city>", port).bright_green()
    );
    println!();

    tokio::select! {
        _ = server::serve(network, port) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            println!();
            println!("{}", "Shutting down".bold());
        }
    }

    Ok(())
}

fn cmd_route(topology: &Path, from: &str, to: &str) -> Result<()> {
    let engine = load_engine(topology)?;

    match engine.query_route(from, to) {
        Ok(info) => {
            println!("{}", "Route".bold());
            println!("  {}", info.route.join(" → ").bright_cyan());
            println!("  Hops: {}", info.hops);
            let via = engine.intermediate_cities(from, to);
            if !via.is_empty() {
                println!("  Via:  {}", via.join(", "));
            }
            Ok(())
        }
        Err(e) => anyhow::bail!("No route from {} to {}: {}", from, to, e),
    }
}

fn cmd_status(topology: &Path) -> Result<()> {
    let engine = load_engine(topology)?;
    let status = engine.status();

    println!("{}", "Topology".bold());
    println!("  Cities:     {}", status.city_count);
    println!("  Edges:      {}", status.edge_count);
    println!("  Tree edges: {}", status.mst_edge_count);
    println!();

    if !status.mst_edges.is_empty() {
        println!("{}", "Spanning tree:".bold());
        for edge in &status.mst_edges {
            println!(
                "  {} — {}  ({})",
                status.city_names[edge.u].bright_cyan(),
                status.city_names[edge.v].bright_cyan(),
                edge.w
            );
        }
    }

    Ok(())
}

fn cmd_encode(text: &str) -> Result<()> {
    let (bits, table) = huffman::encode(text);

    println!("{}", "Code table:".bold());
    for (symbol, code) in table.iter() {
        println!("  {:?}  {}", symbol, code.bright_yellow());
    }
    println!();
    println!("{}", "Bit-string:".bold());
    println!("  {}", bits);
    println!(
        "  {} bits vs {} bits uncompressed",
        bits.len(),
        text.len() * 8
    );

    let decoded = huffman::decode(&bits, &table).context("Round-trip decode failed")?;
    anyhow::ensure!(decoded == text, "Round-trip mismatch");
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>) -> Result<()> {
    let config = config::Config::load(config_path.as_deref())?;

    println!("{}", "Configuration".bold());
    for (key, value) in config.list() {
        println!("  {:20} {}", key.bright_cyan(), value);
    }
    Ok(())
}
