//! transroute CLI
//!
//! Command-line interface for the transparent DNS relay and proxy rules.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;
use commands::Command;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    logging::init(&args)?;

    if matches!(args.command, Command::Run(_)) && !args.quiet {
        print_banner();
    }

    let result = run(args);

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

fn run(args: Args) -> Result<()> {
    let config = args.config.as_deref();
    match args.command {
        Command::Run(run_args) => commands::run::execute(run_args, config),
        Command::Check(check_args) => commands::check::execute(check_args, config),
        Command::Config(config_args) => commands::config::execute(config_args, config),
        Command::Completions(comp_args) => commands::completions::execute(comp_args),
    }
}

fn print_banner() {
    use colored::Colorize;

    println!();
    println!("{}", "╔═══════════════════════════════════════╗".cyan());
    println!(
        "{}{}{}",
        "║  ".cyan(),
        format!("{:<37}", format!("transroute v{}", env!("CARGO_PKG_VERSION"))).green().bold(),
        "║".cyan()
    );
    println!(
        "{}{}{}",
        "║  ".cyan(),
        format!("{:<37}", "Transparent DNS relay").white(),
        "║".cyan()
    );
    println!("{}", "╚═══════════════════════════════════════╝".cyan());
    println!();
}
