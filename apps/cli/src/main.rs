//! Lectern CLI — lecture transcript compiler.
//!
//! Compiles a directory of ordered transcript fragments into one structured
//! document (Markdown, DOCX, or LaTeX) through an LLM rewrite pass.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = commands::Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
