//! zring CLI
//!
//! Builds a ring from the nodes given on the command line and answers
//! placement questions: who owns a key, how the keyspace is split, and how
//! many keys move when a node leaves.

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use zring::{init_logging, HashAlgorithm, HashRing, LoggingConfig, RingConfig};

#[derive(Parser)]
#[command(name = "zring-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect consistent hash ring placement", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Node key to register (repeatable)
    #[arg(
        short,
        long = "node",
        env = "ZRING_NODES",
        value_delimiter = ',',
        help = "Node key to place on the ring"
    )]
    nodes: Vec<String>,
    /// Virtual replicas per node
    #[arg(short, long, help = "Virtual replicas per node (defaults to config)")]
    replicas: Option<usize>,
    /// Hash algorithm
    #[arg(long, help = "Hash algorithm: crc32 or xxh32 (defaults to config)")]
    hash: Option<HashAlgorithm>,
    /// Configuration file
    #[arg(short, long, help = "Path to a toml/json/yaml ring config")]
    config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value = "pretty")]
    output: OutputFormat,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
    /// Silence logging
    #[arg(short = 'q', long)]
    quiet: bool,
    /// Log as JSON lines on stderr
    #[arg(long, env = "ZRING_LOG_JSON")]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the owner of each key
    Resolve {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Print the share of the keyspace each node owns
    Stats,
    /// Print the position index with owners
    Positions,
    /// Resolve synthetic keys and count moves after removing a node
    Simulate {
        #[arg(short = 'k', long, default_value = "100000")]
        keys: usize,
        #[arg(long, help = "Node to remove before resolving again")]
        remove: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    keys: usize,
    per_node: BTreeMap<String, usize>,
    removed: Option<String>,
    moved: usize,
    moved_from_other_nodes: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        json: cli.log_json,
        ..LoggingConfig::from_verbosity(cli.verbose, cli.quiet)
    };
    init_logging(&logging).map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let ring = build_ring(&cli)?;
    debug!(nodes = ring.len(), positions = ring.position_count(), "ring built");

    match &cli.command {
        Commands::Resolve { keys } => resolve(&ring, keys, &cli.output),
        Commands::Stats => print(&ring.statistics(), &cli.output),
        Commands::Positions => positions(&ring, &cli.output),
        Commands::Simulate { keys, remove } => {
            simulate(ring, *keys, remove.as_deref(), &cli.output)
        }
    }
}

fn build_ring(cli: &Cli) -> Result<HashRing<String>> {
    let mut config = match &cli.config {
        Some(path) => RingConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RingConfig::load().context("failed to load config from environment")?,
    };
    if let Some(replicas) = cli.replicas {
        config.default_replicas = replicas;
    }
    if let Some(hash) = cli.hash {
        config.hash = hash;
    }
    config.validate()?;

    if cli.nodes.is_empty() {
        bail!("no nodes given, use --node <KEY> or ZRING_NODES");
    }

    let mut ring = HashRing::from_config(&config);
    for node in &cli.nodes {
        ring.add(node.clone())
            .with_context(|| format!("failed to add node {node}"))?;
    }
    Ok(ring)
}

fn resolve(
    ring: &HashRing<String>,
    keys: &[String],
    output: &OutputFormat,
) -> Result<()> {
    let owners = keys
        .iter()
        .map(|key| Ok((key.clone(), ring.resolve(key)?.clone())))
        .collect::<Result<BTreeMap<_, _>>>()?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&owners)?),
        OutputFormat::Pretty => {
            for key in keys {
                println!("{key} -> {}", owners[key]);
            }
        }
    }
    Ok(())
}

fn positions(
    ring: &HashRing<String>,
    output: &OutputFormat,
) -> Result<()> {
    match output {
        OutputFormat::Json => print(&ring.snapshot(), output),
        OutputFormat::Pretty => {
            for &pos in ring.positions() {
                println!("{pos:>10}  {}", ring.owner_of(pos).unwrap_or("?"));
            }
            Ok(())
        }
    }
}

fn simulate(
    mut ring: HashRing<String>,
    keys: usize,
    remove: Option<&str>,
    output: &OutputFormat,
) -> Result<()> {
    let key_names: Vec<String> = (0..keys).map(|i| format!("key:{i}")).collect();
    let before = key_names
        .iter()
        .map(|k| Ok(ring.resolve_key(k)?.to_owned()))
        .collect::<Result<Vec<_>>>()?;

    let mut per_node = BTreeMap::new();
    for owner in &before {
        *per_node.entry(owner.clone()).or_insert(0) += 1;
    }

    let mut moved = 0;
    let mut moved_from_other_nodes = 0;
    if let Some(node) = remove {
        ring.remove(node)?;
        for (key, old) in key_names.iter().zip(&before) {
            if ring.resolve_key(key)? != old {
                moved += 1;
                if old != node {
                    moved_from_other_nodes += 1;
                }
            }
        }
    }

    let report = SimulationReport {
        keys,
        per_node,
        removed: remove.map(str::to_owned),
        moved,
        moved_from_other_nodes,
    };
    print(&report, output)
}

fn print<T: Serialize + std::fmt::Debug>(
    value: &T,
    output: &OutputFormat,
) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Pretty => println!("{value:#?}"),
    }
    Ok(())
}
