//! stagegate CLI: gated, resumable stage tools for an agent-driven
//! company-screening pipeline.
//!
//! Every subcommand answers with JSON on stdout; logs go to stderr.

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
