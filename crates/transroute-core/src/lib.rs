//! # transroute Core
//!
//! Transparent DNS relay and proxy rule matching for a transparent proxy.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **DNS relay** - Forwards captured queries to their original resolver
//! - **Connection tracking** - Recovers pre-redirect destinations
//! - **Hostname cache** - Remembers which name an address was resolved for
//! - **Proxy rules** - Picks an upstream proxy chain for a destination
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use transroute_core::{HostnameCache, ProxyResolver, RuleStore};
//!
//! # fn main() -> transroute_core::Result<()> {
//! let cache = Arc::new(HostnameCache::new());
//! let rules = RuleStore::from_file("rules.yaml")?;
//! let resolver = ProxyResolver::new(&rules, cache.clone())?;
//!
//! let fallback = vec!["socks5://127.0.0.1:1080".to_string()];
//! let chain = resolver.resolve_proxy("93.184.216.34", 443, &fallback);
//! # let _ = chain;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cache;
pub mod config;
pub mod conntrack;
pub mod dns;
pub mod error;
pub mod resolver;
pub mod rules;

// Re-exports for convenience
pub use cache::{HostnameCache, HostnameStore};
pub use config::Config;
pub use conntrack::{ConnectionRecord, ConntrackLookup};
pub use dns::{AnswerHarvester, DnsRelayServer, MarkedSocketRelay, QueryHandler, UpstreamMode};
pub use error::{Error, Result};
pub use resolver::{Director, HostnameResolver, PatternKind, ProxyResolver};
pub use rules::{load_rule_groups, RuleGroup, RuleStore};
