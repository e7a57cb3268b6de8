//! DNS relay listener and per-query handling

use super::{encode_compressed, failure_response, AnswerHarvester, MarkedSocketRelay};
use crate::cache::HostnameStore;
use crate::config::{CacheConfig, DnsConfig};
use crate::conntrack::ConntrackLookup;
use crate::error::{Error, Result};
use hickory_proto::op::{Message, ResponseCode};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Largest datagram the listener accepts
const MAX_DATAGRAM: usize = 65_535;

/// Replies waiting for the listener to send them
const REPLY_QUEUE: usize = 1024;

/// Where queries are forwarded
#[derive(Debug, Clone)]
pub enum UpstreamMode {
    /// Always the same upstream
    Static(SocketAddr),
    /// The client's original destination, recovered from conntrack
    Redirect {
        /// Table lookup
        lookup: ConntrackLookup,
        /// Used when the lookup fails
        fallback: Option<SocketAddr>,
    },
}

/// Turns one query datagram into one reply datagram
#[derive(Debug)]
pub struct QueryHandler {
    mode: UpstreamMode,
    relay: MarkedSocketRelay,
    harvester: AnswerHarvester,
}

impl QueryHandler {
    /// Create a handler from its parts
    pub fn new(mode: UpstreamMode, relay: MarkedSocketRelay, harvester: AnswerHarvester) -> Self {
        Self {
            mode,
            relay,
            harvester,
        }
    }

    /// Build a handler from configuration, harvesting into `store`
    pub fn from_config(dns: &DnsConfig, cache: &CacheConfig, store: Arc<dyn HostnameStore>) -> Result<Self> {
        let mode = if dns.redirect_aware {
            UpstreamMode::Redirect {
                lookup: ConntrackLookup::new(dns.conntrack_path.clone()),
                fallback: dns.upstream,
            }
        } else {
            let upstream = dns.upstream.ok_or_else(|| {
                Error::config_value("dns.upstream", "An upstream is required unless redirect_aware is enabled")
            })?;
            UpstreamMode::Static(upstream)
        };

        let relay = MarkedSocketRelay::new(dns.effective_mark()).with_timeout(dns.timeout());
        let harvester = AnswerHarvester::new(store).with_grace(cache.grace());
        Ok(Self::new(mode, relay, harvester))
    }

    /// Upstream selection mode
    pub fn mode(&self) -> &UpstreamMode {
        &self.mode
    }

    /// Handle one datagram from `client` received on `listen_port`
    ///
    /// Returns the encoded reply, or `None` when the datagram is not a DNS
    /// message and should be dropped. Every other failure yields SERVFAIL.
    pub async fn handle(&self, packet: &[u8], client: SocketAddr, listen_port: u16) -> Option<Vec<u8>> {
        let query = match Message::from_vec(packet) {
            Ok(query) => query,
            Err(e) => {
                debug!(%client, "Dropping undecodable query: {}", e);
                return None;
            }
        };

        let reply = match self.upstream_for(client, listen_port).await {
            Some(upstream) => match self.relay.relay(&query, packet, upstream).await {
                Ok(reply) => {
                    if reply.response_code() != ResponseCode::NoError {
                        debug!(
                            id = reply.id(),
                            rcode = %reply.response_code(),
                            %upstream,
                            "Upstream answered with failure"
                        );
                    }
                    self.harvester.harvest(&query, &reply);
                    reply
                }
                Err(e) => {
                    warn!(%client, "{}", e);
                    failure_response(&query)
                }
            },
            None => failure_response(&query),
        };

        encode_reply(&reply, &query, client)
    }

    async fn upstream_for(&self, client: SocketAddr, listen_port: u16) -> Option<SocketAddr> {
        let (lookup, fallback) = match &self.mode {
            UpstreamMode::Static(upstream) => return Some(*upstream),
            UpstreamMode::Redirect { lookup, fallback } => (lookup.clone(), *fallback),
        };

        let found = tokio::task::spawn_blocking(move || lookup.original_destination(client, listen_port))
            .await
            .map_err(|e| Error::NotFound(format!("conntrack lookup aborted: {e}")))
            .and_then(|found| found);

        match (found, fallback) {
            (Ok(destination), _) => Some(destination),
            (Err(e), Some(fallback)) => {
                warn!(%client, %fallback, "{}, using static upstream", e);
                Some(fallback)
            }
            (Err(e), None) => {
                error!(%client, "{}, and no static upstream is configured", e);
                None
            }
        }
    }
}

/// Encode `reply`, falling back to SERVFAIL for `query` if that fails
fn encode_reply(reply: &Message, query: &Message, client: SocketAddr) -> Option<Vec<u8>> {
    match encode_compressed(reply) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(%client, id = reply.id(), "Cannot encode reply: {}", e);
            match encode_compressed(&failure_response(query)) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    error!(%client, id = query.id(), "Cannot encode SERVFAIL: {}", e);
                    None
                }
            }
        }
    }
}

/// UDP listener relaying every query through a [`QueryHandler`]
///
/// Each datagram is handled on its own task, so one slow upstream or a
/// stalled conntrack read only delays its own client. Handlers hand their
/// replies back to the listener, which is the only owner of the socket.
#[derive(Debug)]
pub struct DnsRelayServer {
    listen: SocketAddr,
    handler: Arc<QueryHandler>,
    shutdown: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl DnsRelayServer {
    /// Create a server for `listen`
    pub fn new(listen: SocketAddr, handler: QueryHandler) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            listen,
            handler: Arc::new(handler),
            shutdown,
            local_addr: Mutex::new(None),
        }
    }

    /// Configured listen address
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
    }

    /// Bound address while serving
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Query handler shared by all tasks
    pub fn handler(&self) -> &Arc<QueryHandler> {
        &self.handler
    }

    /// Bind and serve in the background
    ///
    /// Returns once the socket is bound, or with the bind error.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let server = Arc::clone(self);

        tokio::spawn(async move {
            match server.bind().await {
                Ok(socket) => {
                    let _ = ready_tx.send(Ok(()));
                    server.serve(socket).await;
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        ready_rx.await.map_err(|_| {
            Error::Io(std::io::Error::other("DNS relay task ended before binding"))
        })?
    }

    /// Bind and serve until [`stop`](Self::stop) is called
    ///
    /// Returns right after binding if the server was already stopped.
    pub async fn run(&self) -> Result<()> {
        let socket = self.bind().await?;
        self.serve(socket).await;
        Ok(())
    }

    /// Stop accepting queries and close the listening socket
    ///
    /// Stopping is final, even when called before the server has bound.
    /// Relays already in flight keep running until their own deadlines and
    /// their replies are discarded.
    pub fn stop(&self) {
        debug!("Stopping DNS relay");
        self.shutdown.send_replace(true);
    }

    async fn bind(&self) -> Result<UdpSocket> {
        let socket = UdpSocket::bind(self.listen).await?;
        let local = socket.local_addr()?;
        *self.local_addr.lock() = Some(local);
        info!(%local, "DNS relay listening");
        Ok(socket)
    }

    async fn serve(&self, socket: UdpSocket) {
        let listen_port = self.local_addr().map_or(self.listen.port(), |a| a.port());
        let mut shutdown = self.shutdown.subscribe();
        let (reply_tx, mut replies) = mpsc::channel::<(Vec<u8>, SocketAddr)>(REPLY_QUEUE);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some((reply, client)) = replies.recv() => {
                    if let Err(e) = socket.send_to(&reply, client).await {
                        warn!(%client, "Cannot send reply: {}", e);
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, client) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("DNS relay receive error: {}", e);
                            continue;
                        }
                    };

                    let packet = buf[..len].to_vec();
                    let handler = Arc::clone(&self.handler);
                    let reply_tx = reply_tx.clone();
                    tokio::spawn(async move {
                        if let Some(reply) = handler.handle(&packet, client, listen_port).await {
                            if reply_tx.send((reply, client)).await.is_err() {
                                debug!(%client, "DNS relay stopped, reply discarded");
                            }
                        }
                    });
                }
            }
        }

        drop(replies);
        drop(socket);
        *self.local_addr.lock() = None;
        info!("DNS relay stopped");
    }
}
