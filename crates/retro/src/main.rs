//! retro - Retro Board CLI
//!
//! Standalone notes and timed retro sessions over a local SQLite store.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod context;
mod error;

use cli::{Cli, Commands};
use retro_core::RetroConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("retro=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => RetroConfig::load_from(path)?,
        None => RetroConfig::load()?,
    };

    // Execute command
    match cli.command {
        Commands::Note(cmd) => commands::note::execute(cmd, &cli.identity, &config).await,
        Commands::Session(cmd) => commands::session::execute(cmd, &cli.identity, &config).await,
        Commands::Config => commands::config::execute(&config),
        Commands::Version => {
            println!("retro {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
