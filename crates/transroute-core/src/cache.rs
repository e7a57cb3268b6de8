//! Reverse hostname cache
//!
//! Maps IPv4 literals to the hostname that was queried when the address was
//! last seen in a DNS answer. The relay writes into it, the proxy resolver
//! reads from it, and both run on many tasks at once, so the store is a
//! `DashMap` and needs no external locking.

use crate::resolver::HostnameResolver;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Extra lifetime added on top of the answer TTL
pub const DEFAULT_GRACE: Duration = Duration::from_secs(300);

/// Write side of the hostname cache
///
/// Implementations must be safe to call from concurrent handlers.
pub trait HostnameStore: Send + Sync {
    /// Remember `hostname` for `ip` for `ttl`
    fn store_ttl(&self, ip: &str, hostname: &str, ttl: Duration);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    hostname: String,
    expires: Instant,
}

/// TTL-keyed IP → hostname cache
///
/// Entries are refreshed by newer answers and dropped once expired, either
/// lazily on lookup or by [`HostnameCache::cleanup`].
#[derive(Debug, Default)]
pub struct HostnameCache {
    entries: DashMap<String, CacheEntry>,
}

impl HostnameCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Hostname recorded for `ip`, if present and not expired
    pub fn get(&self, ip: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(ip) {
            if entry.expires > Instant::now() {
                return Some(entry.hostname.clone());
            }
            drop(entry);
            self.entries.remove(ip);
        }
        None
    }

    /// Drop expired entries
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires > now);
    }

    /// Number of entries, expired ones included until cleaned up
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl HostnameStore for HostnameCache {
    fn store_ttl(&self, ip: &str, hostname: &str, ttl: Duration) {
        trace!(ip, hostname, ttl_secs = ttl.as_secs(), "Caching hostname");
        self.entries.insert(
            ip.to_string(),
            CacheEntry {
                hostname: hostname.to_string(),
                expires: Instant::now() + ttl,
            },
        );
    }
}

impl HostnameResolver for HostnameCache {
    fn hostname(&self, ip: &str) -> Option<String> {
        self.get(ip)
    }
}
