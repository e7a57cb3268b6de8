//! Original destination recovery
//!
//! A redirect rule rewrites a client's DNS datagram so it lands on the local
//! listener. The kernel still tracks the flow, and the tracked row keeps the
//! destination the client originally asked for. Reading that table is the
//! only way to learn which resolver the client wanted.
//!
//! The table is usually readable only by root.

mod record;

pub use record::{ConnectionRecord, Endpoint};

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, error, Level};

/// Default location of the connection-tracking table
pub const DEFAULT_CONNTRACK_PATH: &str = "/proc/self/net/nf_conntrack";

/// Looks up pre-redirect destinations in the tracking table
#[derive(Debug, Clone)]
pub struct ConntrackLookup {
    path: PathBuf,
}

impl Default for ConntrackLookup {
    fn default() -> Self {
        Self::new(DEFAULT_CONNTRACK_PATH)
    }
}

impl ConntrackLookup {
    /// Read the table at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the table being read
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original destination of a datagram from `client` to `listen_port`
    ///
    /// Blocks while the table is read. Fails with [`Error::NotFound`] when
    /// the table cannot be opened or no row matches.
    pub fn original_destination(&self, client: SocketAddr, listen_port: u16) -> Result<SocketAddr> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                debug!(
                    path = %self.path.display(),
                    "Cannot open conntrack table, root is required to get original destination: {}",
                    e
                );
            } else {
                error!(path = %self.path.display(), "Cannot open conntrack table: {}", e);
            }
            Error::NotFound(format!("cannot open {}: {e}", self.path.display()))
        })?;

        Self::find_in(BufReader::new(file), client, listen_port)
    }

    /// Scan table lines from `reader`, first matching row wins
    ///
    /// Rows that are not valid UTF-8 are read lossily and simply fail to match.
    pub fn find_in<R: BufRead>(mut reader: R, client: SocketAddr, listen_port: u16) -> Result<SocketAddr> {
        let client = client.to_string();
        let listen_port = listen_port.to_string();
        let trace_misses = tracing::enabled!(Level::DEBUG);
        let mut scanned = Vec::new();
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let read = reader
                .read_until(b'\n', &mut raw)
                .map_err(|e| Error::NotFound(format!("cannot read conntrack table: {e}")))?;
            if read == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(record) = ConnectionRecord::parse(line) {
                if record.matches(&client, &listen_port) {
                    debug!(%record, "Found original destination");
                    let destination = record.local_destination.to_string();
                    return destination.parse().map_err(|_| {
                        Error::NotFound(format!("unparsable original destination {destination}"))
                    });
                }
            }
            if trace_misses {
                scanned.push(line.to_string());
            }
        }

        for line in &scanned {
            debug!("nf_conntrack>> {}", line);
        }
        Err(Error::NotFound(format!(
            "no conntrack row for r_dst={client}, proxy_port={listen_port}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_missing_table_is_not_found() {
        let lookup = ConntrackLookup::new("/nonexistent/nf_conntrack");
        let client: SocketAddr = "192.168.1.20:40000".parse().unwrap();
        let err = lookup.original_destination(client, 5353).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_last_line_without_newline() {
        let table = "ipv4 2 udp 17 28 src=10.0.0.2 dst=1.1.1.1 sport=1000 dport=53 \
                     src=127.0.0.1 dst=10.0.0.2 sport=5353 dport=1000";
        let client: SocketAddr = "10.0.0.2:1000".parse().unwrap();
        let found = ConntrackLookup::find_in(Cursor::new(table), client, 5353).unwrap();
        assert_eq!(found, "1.1.1.1:53".parse().unwrap());
    }
}
