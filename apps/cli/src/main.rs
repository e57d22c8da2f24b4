//! Draftline CLI — unattended editorial pipeline.
//!
//! Validates, enriches, and publishes long-form drafts on a schedule, and
//! independently monitors discussion forums for engagement opportunities.

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
