//! Show the effective configuration.

use anyhow::Result;
use colored::Colorize;
use retro_core::RetroConfig;

pub fn execute(config: &RetroConfig) -> Result<()> {
    println!("{} {}", "Config file:".bold(), RetroConfig::config_path().display());
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
