//! doctrail CLI — track documentation changes in remote repositories.
//!
//! Mirrors a repository, snapshots its documents, diffs against the previous
//! capture, and refreshes the generated posts.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
