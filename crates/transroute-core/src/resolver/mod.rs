//! Proxy selection
//!
//! Decides which upstream proxy, if any, handles a destination address by
//! walking the rule groups in file order. The first pattern that matches,
//! in any group, picks the proxy; there is no ranking by specificity.
//!
//! Domain patterns need a hostname for the destination. It comes from an
//! injected [`HostnameResolver`], normally the [`HostnameCache`] filled by
//! the DNS relay.
//!
//! [`HostnameCache`]: crate::cache::HostnameCache

mod pattern;

pub use pattern::{MatchTarget, Pattern, PatternKind};

use crate::error::Result;
use crate::rules::RuleStore;
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Looks up the hostname last seen for an IP literal
#[cfg_attr(test, mockall::automock)]
pub trait HostnameResolver {
    /// Hostname for `ip`, `None` when unknown
    fn hostname(&self, ip: &str) -> Option<String>;
}

impl<F> HostnameResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn hostname(&self, ip: &str) -> Option<String> {
        self(ip)
    }
}

/// Resolver that never knows a hostname
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHostnames;

impl HostnameResolver for NoHostnames {
    fn hostname(&self, _ip: &str) -> Option<String> {
        None
    }
}

/// Fixed IP → hostname table
#[derive(Debug, Clone, Default)]
pub struct StaticHostnames(HashMap<String, String>);

impl StaticHostnames {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping
    pub fn with(mut self, ip: impl Into<String>, hostname: impl Into<String>) -> Self {
        self.0.insert(ip.into(), hostname.into());
        self
    }
}

impl HostnameResolver for StaticHostnames {
    fn hostname(&self, ip: &str) -> Option<String> {
        self.0.get(ip).cloned()
    }
}

/// Shared handle to a hostname resolver
pub type SharedHostnames = Arc<dyn HostnameResolver + Send + Sync>;

/// Predicate over a destination address
pub type Director = Box<dyn Fn(&IpAddr) -> bool + Send + Sync>;

#[derive(Debug)]
struct ProxyGroup {
    proxy: String,
    patterns: Vec<Pattern>,
}

/// Matches destinations against the loaded rule groups
pub struct ProxyResolver {
    proxied: Vec<ProxyGroup>,
    direct: Vec<Arc<Pattern>>,
    hostnames: SharedHostnames,
}

impl ProxyResolver {
    /// Compile every pattern of `rules`
    ///
    /// Fails on the first domain or CIDR pattern that does not compile, so
    /// a bad rule stops startup instead of surfacing during matching.
    pub fn new(rules: &RuleStore, hostnames: SharedHostnames) -> Result<Self> {
        let proxied = rules
            .proxied()
            .map(|group| {
                Ok(ProxyGroup {
                    proxy: group.proxy().to_string(),
                    patterns: compile_all(&group.rules)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut direct = Vec::new();
        for group in rules.direct() {
            direct.extend(compile_all(&group.rules)?.into_iter().map(Arc::new));
        }

        debug!(
            proxied_groups = proxied.len(),
            direct_patterns = direct.len(),
            "Compiled proxy rules"
        );

        Ok(Self {
            proxied,
            direct,
            hostnames,
        })
    }

    /// Pick the proxy chain for `destination`
    ///
    /// On a match, returns a new chain with the matched proxy in front of
    /// `fallback`. Without a match, returns `fallback` itself, borrowed.
    /// Direct groups are never consulted here.
    pub fn resolve_proxy<'a>(
        &self,
        destination: &str,
        port: u16,
        fallback: &'a [String],
    ) -> Cow<'a, [String]> {
        let target = MatchTarget::new(destination, self.hostnames.as_ref());

        for group in &self.proxied {
            for pattern in &group.patterns {
                if pattern.matches(&target) {
                    debug!(
                        kind = %pattern.kind(),
                        pattern = pattern.raw(),
                        hostname = target.cached_hostname().unwrap_or(""),
                        destination,
                        port,
                        proxy = %group.proxy,
                        "Resolved proxy"
                    );
                    return Cow::Owned(prepend(&group.proxy, fallback));
                }
            }
        }

        Cow::Borrowed(fallback)
    }

    /// Build direct-routing predicates
    ///
    /// With `only_no_proxy`, returns one predicate per pattern of the direct
    /// groups, flattened in file order. Otherwise returns one predicate that
    /// holds when no proxy group claims the address and at least one direct
    /// pattern does.
    pub fn director_funcs(self: &Arc<Self>, only_no_proxy: bool) -> Vec<Director> {
        let directors: Vec<Director> = self
            .direct
            .iter()
            .map(|pattern| {
                let pattern = Arc::clone(pattern);
                let hostnames = Arc::clone(&self.hostnames);
                Box::new(move |ip: &IpAddr| {
                    let destination = ip.to_string();
                    pattern.matches(&MatchTarget::new(&destination, hostnames.as_ref()))
                }) as Director
            })
            .collect();

        if only_no_proxy {
            return directors;
        }

        let resolver = Arc::clone(self);
        let composite: Director = Box::new(move |ip: &IpAddr| {
            if !resolver.resolve_proxy(&ip.to_string(), 0, &[]).is_empty() {
                return false;
            }
            directors.iter().any(|direct| direct(ip))
        });
        vec![composite]
    }

    /// Number of compiled direct patterns
    pub fn direct_pattern_count(&self) -> usize {
        self.direct.len()
    }

    /// Number of proxy groups
    pub fn proxy_group_count(&self) -> usize {
        self.proxied.len()
    }
}

impl std::fmt::Debug for ProxyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResolver")
            .field("proxied", &self.proxied)
            .field("direct", &self.direct)
            .finish_non_exhaustive()
    }
}

fn compile_all(rules: &[String]) -> Result<Vec<Pattern>> {
    rules.iter().map(|raw| Pattern::compile(raw)).collect()
}

fn prepend(proxy: &str, chain: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(chain.len() + 1);
    out.push(proxy.to_string());
    out.extend_from_slice(chain);
    out
}
