//! MathPrereq CLI: prerequisite paths and learning resources for math questions.
//!
//! Answers questions through the query pipeline, reuses cached concept
//! answers, and reports on stored queries and discovered resources.

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
