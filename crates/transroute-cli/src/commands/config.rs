//! Config command - configuration management

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;
use transroute_core::Config;

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Config file to show (default: --config, else built-in defaults)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output file path, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate (default: --config)
        file: Option<PathBuf>,
    },
}

/// Execute config command
pub fn execute(args: ConfigArgs, global_config: Option<&Path>) -> Result<()> {
    match args.action {
        ConfigAction::Show { file } => show_config(file.as_deref().or(global_config)),
        ConfigAction::Generate { output } => generate_config(output.as_deref()),
        ConfigAction::Validate { file } => {
            let file = file
                .as_deref()
                .or(global_config)
                .context("No configuration file given")?;
            validate_config(file)
        }
    }
}

fn show_config(file: Option<&Path>) -> Result<()> {
    let config = super::load_config(file)?;
    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let toml_str = Config::default()
        .to_toml()
        .context("Failed to serialize config")?;

    let content = format!(
        "# transroute configuration\n\
         # Set dns.upstream, or enable dns.redirect_aware to follow conntrack\n\n\
         {toml_str}"
    );

    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            info!("Generated config file: {}", path.display());
            println!("Configuration file generated: {}", path.display());
        }
        None => print!("{content}"),
    }

    Ok(())
}

fn validate_config(file: &Path) -> Result<()> {
    let config = super::load_config(Some(file))?;
    config.validate().context("Configuration validation failed")?;

    let upstream = config
        .dns
        .upstream
        .map_or_else(|| "none".to_string(), |u| u.to_string());

    println!("{} Configuration is valid", "✓".green());
    println!("  Listen: {}", config.dns.listen);
    println!("  Upstream: {upstream}");
    println!("  Redirect-aware: {}", config.dns.redirect_aware);
    if let Some(mark) = config.dns.effective_mark() {
        println!("  Routing mark: {mark}");
    }
    if let Some(ref rules) = config.rules.file {
        println!("  Rules: {}", rules.display());
    }

    Ok(())
}
