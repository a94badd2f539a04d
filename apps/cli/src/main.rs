//! Artemis CLI: seed, harvest and drain a persistent web frontier.
//!
//! Expands seeds into a prioritized frontier, harvests entries with
//! bounded recursion, and reroutes around dead branches.

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
