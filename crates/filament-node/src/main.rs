//! Filament node daemon.
//!
//! One process per simulated network node. Runs the three-layer stack at
//! 1 Hz against the shared channel directory, then flushes everything the
//! transport received and exits.
//!
//! Two invocation forms share one positional grammar:
//!
//! - source node:     `filament-node <id> <duration> <dest> <message> <starting_time> <neighbor…>`
//! - non-source node: `filament-node <id> <duration> <dest> <neighbor…>`
//!
//! A node is a source iff the fourth positional is non-numeric (the
//! message); everything after the fixed head is neighbor ids.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use filament_stack::node::{Node, NodeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Filament simulated-network node.
#[derive(Parser, Debug)]
#[command(name = "filament-node", about = "Filament simulated-network node")]
struct Cli {
    /// Node id (single decimal digit).
    id: u8,

    /// Seconds to run before flushing output and exiting.
    duration: u32,

    /// Destination node id for this node's transport session.
    dest: u8,

    /// `<message> <starting_time> <neighbor…>` for a source node,
    /// `<neighbor…>` otherwise.
    #[arg(required = true)]
    rest: Vec<String>,

    /// Directory holding the channel files.
    #[arg(long, default_value = "channels")]
    channel_dir: PathBuf,

    /// Directory receiving the per-node output files.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

/// Split the trailing positionals into `(message, starting_time,
/// neighbors)`. A leading numeric means there is no message.
fn split_rest(rest: &[String]) -> anyhow::Result<(String, i64, Vec<u8>)> {
    let (message, start, neighbors) = if rest[0].parse::<u64>().is_ok() {
        (String::new(), -1, &rest[..])
    } else {
        let start = rest
            .get(1)
            .context("a message requires a starting time after it")?
            .parse::<i64>()
            .context("starting time is not a number")?;
        (rest[0].clone(), start, rest.get(2..).unwrap_or_default())
    };
    let neighbors = neighbors
        .iter()
        .map(|n| n.parse::<u8>().with_context(|| format!("bad neighbor id {n:?}")))
        .collect::<anyhow::Result<Vec<u8>>>()?;
    Ok((message, start, neighbors))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (message, starting_time, neighbors) = split_rest(&cli.rest)?;
    let cfg = NodeConfig::new(
        cli.id,
        cli.duration,
        cli.dest,
        &message,
        starting_time,
        &neighbors,
    )
    .context("invalid node parameters")?
    .with_dirs(cli.channel_dir, cli.output_dir);

    let mut node = Node::new(cfg)?;
    info!(node = %node.id(), duration = node.duration(), "node starting");

    for sec in 0..node.duration() {
        node.tick(sec)?;
        thread::sleep(Duration::from_secs(1));
    }

    node.finish()?;
    info!(node = %node.id(), "node closing");
    Ok(())
}
