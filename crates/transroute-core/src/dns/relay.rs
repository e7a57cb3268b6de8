//! Single-shot upstream relay
//!
//! Every query gets its own UDP socket, optionally tagged with a routing
//! mark so its egress skips the redirect rule that captured the client's
//! query. The socket is connected to the upstream, used for one write and
//! one read, and dropped on every exit path.

use crate::error::{Error, Result};
use hickory_proto::op::Message;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

/// Default write and read deadline
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Conventional DNS-over-UDP size ceiling
pub const MIN_UDP_SIZE: usize = 512;

/// Relays one query per call over a fresh socket
#[derive(Debug, Clone)]
pub struct MarkedSocketRelay {
    mark: Option<u32>,
    timeout: Duration,
}

impl Default for MarkedSocketRelay {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MarkedSocketRelay {
    /// Create a relay, tagging sockets with `mark` when set
    pub fn new(mark: Option<u32>) -> Self {
        Self {
            mark,
            timeout: RELAY_TIMEOUT,
        }
    }

    /// Override the write and read deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Routing mark applied to relay sockets
    pub fn mark(&self) -> Option<u32> {
        self.mark
    }

    /// Forward `query` (whose wire form is `raw`) and decode the reply
    ///
    /// The reply buffer is sized from the query's EDNS0 payload size when it
    /// advertises at least 512 bytes.
    pub async fn relay(&self, query: &Message, raw: &[u8], upstream: SocketAddr) -> Result<Message> {
        let reply = self.exchange(raw, reply_size(query), upstream).await?;
        Message::from_vec(&reply).map_err(|e| Error::relay(upstream, format!("bad reply: {e}")))
    }

    /// Send `packet` to `upstream` and read exactly one datagram back
    pub async fn exchange(&self, packet: &[u8], reply_size: usize, upstream: SocketAddr) -> Result<Vec<u8>> {
        let socket = self
            .open(upstream)
            .map_err(|e| Error::relay(upstream, format!("dial: {e}")))?;

        if let Ok(local) = socket.local_addr() {
            debug!(%local, %upstream, "Start DNS relay");
        }

        timeout(self.timeout, socket.send(packet))
            .await
            .map_err(|_| Error::relay(upstream, format!("write timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::relay(upstream, format!("write: {e}")))?;

        let mut buf = vec![0u8; reply_size];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::relay(upstream, format!("read timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::relay(upstream, format!("read: {e}")))?;

        buf.truncate(len);
        Ok(buf)
    }

    fn open(&self, upstream: SocketAddr) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::for_address(upstream), Type::DGRAM, Some(Protocol::UDP))?;

        if let Some(mark) = self.mark {
            set_mark(&socket, mark)?;
        }

        socket.set_nonblocking(true)?;
        socket.connect(&upstream.into())?;
        UdpSocket::from_std(socket.into())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_mark(socket: &Socket, mark: u32) -> std::io::Result<()> {
    socket.set_mark(mark).map_err(|e| {
        debug!("Cannot set socket mark {}: {}", mark, e);
        e
    })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_mark(_socket: &Socket, mark: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("socket mark {mark} is only supported on Linux"),
    ))
}

/// Reply buffer size for `query`
pub fn reply_size(query: &Message) -> usize {
    query
        .extensions()
        .as_ref()
        .map(|edns| usize::from(edns.max_payload()))
        .filter(|&size| size >= MIN_UDP_SIZE)
        .unwrap_or(MIN_UDP_SIZE)
}
