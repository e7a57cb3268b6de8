//! CLI commands

pub mod check;
pub mod completions;
pub mod config;
pub mod run;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;
use transroute_core::Config;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the DNS relay (main command)
    Run(run::RunArgs),

    /// Show which proxy chain a destination would use
    Check(check::CheckArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Load the configuration file, or defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}
