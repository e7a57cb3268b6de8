//! Hostname harvesting from relayed answers

use crate::cache::{HostnameStore, DEFAULT_GRACE};
use hickory_proto::op::Message;
use hickory_proto::rr::{DNSClass, RData, RecordType};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Copies A-record answers into a [`HostnameStore`]
#[derive(Clone)]
pub struct AnswerHarvester {
    store: Arc<dyn HostnameStore>,
    grace: Duration,
}

impl AnswerHarvester {
    /// Harvest into `store` with the default grace period
    pub fn new(store: Arc<dyn HostnameStore>) -> Self {
        Self {
            store,
            grace: DEFAULT_GRACE,
        }
    }

    /// Override the grace period added to every TTL
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Record every IN/A answer of `reply` under the query's hostname
    ///
    /// The hostname is the last question of `query`, kept in wire form with
    /// its trailing dot. Returns how many entries were stored.
    pub fn harvest(&self, query: &Message, reply: &Message) -> usize {
        let Some(hostname) = query.queries().last().map(|q| q.name().to_string()) else {
            return 0;
        };
        if hostname.is_empty() {
            return 0;
        }

        let mut stored = 0;
        for record in reply.answers() {
            if record.record_type() != RecordType::A || record.dns_class() != DNSClass::IN {
                continue;
            }
            let Some(RData::A(addr)) = record.data() else {
                continue;
            };

            let ip = addr.0.to_string();
            let ttl = Duration::from_secs(u64::from(record.ttl())) + self.grace;
            trace!(%ip, %hostname, "Harvested A record");
            self.store.store_ttl(&ip, &hostname, ttl);
            stored += 1;
        }
        stored
    }
}

impl std::fmt::Debug for AnswerHarvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerHarvester")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}
