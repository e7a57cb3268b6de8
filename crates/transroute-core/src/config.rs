//! Runtime configuration
//!
//! TOML-backed settings for the DNS relay, the rule file and the hostname
//! cache. Every section has defaults, so a partial file is fine.

use crate::conntrack::DEFAULT_CONNTRACK_PATH;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DNS relay settings
    pub dns: DnsConfig,

    /// Proxy rule settings
    pub rules: RulesConfig,

    /// Hostname cache settings
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.dns.upstream {
            None if !self.dns.redirect_aware => {
                return Err(Error::config_value(
                    "dns.upstream",
                    "An upstream is required unless redirect_aware is enabled",
                ));
            }
            Some(upstream) if !upstream.is_ipv4() => {
                return Err(Error::config_value(
                    "dns.upstream",
                    format!("Only IPv4 upstreams are supported, got {upstream}"),
                ));
            }
            Some(upstream) if upstream.port() == 0 => {
                return Err(Error::config_value("dns.upstream", "Port must be non-zero"));
            }
            _ => {}
        }

        if self.dns.timeout_secs == 0 {
            return Err(Error::config_value("dns.timeout_secs", "Must be at least 1"));
        }

        if self.cache.cleanup_interval_secs == 0 {
            return Err(Error::config_value(
                "cache.cleanup_interval_secs",
                "Must be at least 1",
            ));
        }

        Ok(())
    }
}

/// DNS relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Address the relay listens on
    pub listen: SocketAddr,
    /// Static upstream, also the fallback when conntrack lookup fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<SocketAddr>,
    /// Recover each query's original destination from conntrack
    pub redirect_aware: bool,
    /// Mark set on relay sockets in redirect-aware mode, 0 disables it
    pub routing_mark: u32,
    /// Connection-tracking table to read
    pub conntrack_path: PathBuf,
    /// Write and read deadline of each relay, in seconds
    pub timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5353)),
            upstream: None,
            redirect_aware: false,
            routing_mark: 255,
            conntrack_path: PathBuf::from(DEFAULT_CONNTRACK_PATH),
            timeout_secs: 5,
        }
    }
}

impl DnsConfig {
    /// Relay deadline as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Mark to apply to relay sockets, if any
    pub fn effective_mark(&self) -> Option<u32> {
        (self.redirect_aware && self.routing_mark != 0).then_some(self.routing_mark)
    }
}

/// Proxy rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rule file to load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Hostname cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds added to every answer TTL
    pub grace_secs: u64,
    /// Seconds between sweeps of expired entries
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            grace_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    /// Grace period as a duration
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Cleanup interval as a duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
