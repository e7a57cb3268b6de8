//! Run command - serve the DNS relay

use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use transroute_core::{Config, DnsRelayServer, HostnameCache, ProxyResolver, QueryHandler, RuleStore};

/// Run command arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Address to listen on
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Static upstream resolver, also the fallback in redirect-aware mode
    #[arg(short, long, value_name = "ADDR")]
    pub upstream: Option<SocketAddr>,

    /// Forward each query to its original destination from conntrack (needs root)
    #[arg(long)]
    pub redirect_aware: bool,

    /// Routing mark for relay sockets in redirect-aware mode, 0 disables it
    #[arg(short, long, value_name = "MARK")]
    pub mark: Option<u32>,

    /// Proxy rule file, checked before serving
    #[arg(short, long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Connection-tracking table to read
    #[arg(long, value_name = "FILE")]
    pub conntrack: Option<PathBuf>,

    /// Relay write and read deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Validate everything and exit without serving
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.dns.listen = listen;
        }
        if let Some(upstream) = self.upstream {
            config.dns.upstream = Some(upstream);
        }
        if self.redirect_aware {
            config.dns.redirect_aware = true;
        }
        if let Some(mark) = self.mark {
            config.dns.routing_mark = mark;
        }
        if let Some(ref rules) = self.rules {
            config.rules.file = Some(rules.clone());
        }
        if let Some(ref conntrack) = self.conntrack {
            config.dns.conntrack_path = conntrack.clone();
        }
        if let Some(timeout) = self.timeout {
            config.dns.timeout_secs = timeout;
        }
    }
}

/// Execute the run command
pub fn execute(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    info!("Starting transroute...");

    // Priority: flags > config file > defaults
    let mut config = super::load_config(config_path)?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let cache = Arc::new(HostnameCache::new());
    if let Some(ref path) = config.rules.file {
        check_rules(path, &cache)?;
    }

    if args.dry_run {
        info!("Configuration validated successfully");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(serve(config, cache))?;

    info!("transroute stopped");
    Ok(())
}

/// Load and compile the rule file so a bad rule stops startup
fn check_rules(path: &Path, cache: &Arc<HostnameCache>) -> Result<()> {
    let rules = RuleStore::from_file(path)
        .with_context(|| format!("Failed to load rules from {}", path.display()))?;
    let resolver = ProxyResolver::new(&rules, cache.clone())
        .with_context(|| format!("Invalid rule in {}", path.display()))?;

    info!(
        proxy_groups = resolver.proxy_group_count(),
        direct_patterns = resolver.direct_pattern_count(),
        "Proxy rules ready"
    );
    Ok(())
}

async fn serve(config: Config, cache: Arc<HostnameCache>) -> Result<()> {
    let handler = QueryHandler::from_config(&config.dns, &config.cache, cache.clone())?;
    let server = Arc::new(DnsRelayServer::new(config.dns.listen, handler));

    server
        .start()
        .await
        .with_context(|| format!("Failed to listen on {}", config.dns.listen))?;

    info!(
        listen = %server.local_addr().unwrap_or(config.dns.listen),
        upstream = ?config.dns.upstream,
        redirect_aware = config.dns.redirect_aware,
        mark = ?config.dns.effective_mark(),
        "DNS relay running, press Ctrl+C to stop"
    );

    let cleanup = {
        let cache = cache.clone();
        let period = config.cache.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup();
                debug!(entries = cache.len(), "Hostname cache cleaned up");
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received interrupt signal, shutting down...");

    server.stop();
    cleanup.abort();
    Ok(())
}
