//! Reset a simulation between runs: clear every channel and output file.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Clear the channel and output directories.
#[derive(Parser, Debug)]
#[command(name = "reset", about = "Clear Filament channel and output files")]
struct Cli {
    /// Directory holding the channel files.
    #[arg(long, default_value = "channels")]
    channel_dir: PathBuf,

    /// Directory receiving the per-node output files.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let channels = filament_sim::clear_dir(&cli.channel_dir)?;
    let outputs = filament_sim::clear_dir(&cli.output_dir)?;
    tracing::info!(channels, outputs, "simulation reset");
    Ok(())
}
