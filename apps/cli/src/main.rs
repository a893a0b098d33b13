//! Curator CLI: triage list-addition PRs into a curated README.
//!
//! Identifies PRs that add entries, merges validated entries into the
//! document, and closes the originals once a combined PR supersedes them.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli)?;
    commands::run(cli).await
}
