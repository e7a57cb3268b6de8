//! Check command - evaluate proxy rules for one destination

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use transroute_core::resolver::StaticHostnames;
use transroute_core::{ProxyResolver, RuleStore};

/// Check command arguments
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Destination address to evaluate
    pub destination: IpAddr,

    /// Destination port, for logging only
    #[arg(short, long, default_value = "0")]
    pub port: u16,

    /// Proxy rule file (default: rules.file from the config)
    #[arg(short, long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Pretend the destination was resolved from this hostname
    #[arg(long, value_name = "NAME")]
    pub hostname: Option<String>,

    /// Fallback proxy chain, in order
    #[arg(short, long = "fallback", value_name = "PROXY")]
    pub fallback: Vec<String>,
}

/// Execute check command
pub fn execute(args: CheckArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let rules_path = args
        .rules
        .clone()
        .or(config.rules.file)
        .context("No rule file given, use --rules or set rules.file")?;

    let rules = RuleStore::from_file(&rules_path)
        .with_context(|| format!("Failed to load rules from {}", rules_path.display()))?;

    let destination = args.destination.to_string();
    let mut hostnames = StaticHostnames::new();
    if let Some(ref hostname) = args.hostname {
        hostnames = hostnames.with(destination.clone(), hostname.clone());
    }

    let resolver = Arc::new(
        ProxyResolver::new(&rules, Arc::new(hostnames))
            .with_context(|| format!("Invalid rule in {}", rules_path.display()))?,
    );

    let chain = resolver.resolve_proxy(&destination, args.port, &args.fallback);
    let direct = resolver
        .director_funcs(false)
        .iter()
        .any(|is_direct| is_direct(&args.destination));
    let direct_hits = resolver
        .director_funcs(true)
        .iter()
        .filter(|is_direct| is_direct(&args.destination))
        .count();

    println!("Destination: {}", destination.cyan());
    if let Some(ref hostname) = args.hostname {
        println!("  Hostname: {hostname}");
    }
    if chain.is_empty() {
        println!("  Proxy chain: {}", "(none)".yellow());
    } else {
        println!("  Proxy chain: {}", chain.join(" -> ").green());
    }
    println!(
        "  Direct: {} ({} direct pattern(s) match)",
        if direct { "yes".green() } else { "no".red() },
        direct_hits
    );

    Ok(())
}
