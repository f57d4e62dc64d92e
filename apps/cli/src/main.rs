//! SEO Compass CLI: submit sites for competitor, keyword and content analysis.
//!
//! Jobs are stored in a local libSQL database; reports can be read while a
//! job runs and downloaded as a ZIP archive once it completes.

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
